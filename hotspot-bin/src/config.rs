use clap::Parser;
use hotspot_core::Config;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, value_parser, default_value = "/etc/hotspot/hotspot.toml")]
    pub config_file: PathBuf,
}

pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let args = Args::parse();
    load_config_from_path(&args.config_file)
}

pub fn load_config_from_path(path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}
