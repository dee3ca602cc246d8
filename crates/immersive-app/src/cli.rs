use std::path::PathBuf;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliFlags {
    pub config_path: Option<PathBuf>,
    pub unsupported: bool,
    pub no_xr_api: bool,
    pub block_autoplay: bool,
    pub deny_session: Option<String>,
    pub help: bool,
}

pub fn parse_cli_flags<I>(args: I) -> AppResult<CliFlags>
where
    I: IntoIterator<Item = String>,
{
    let mut flags = CliFlags::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = read_cli_value(
                    &arg,
                    args.next().ok_or_else(|| {
                        AppError::configuration(
                            "Missing value after --config. Use --config <path>.",
                        )
                    })?,
                )?;
                flags.config_path = Some(PathBuf::from(value));
            }
            "--unsupported" => flags.unsupported = true,
            "--no-xr-api" => flags.no_xr_api = true,
            "--block-autoplay" => flags.block_autoplay = true,
            "--deny-session" => {
                // An empty reason is allowed: it exercises the generic denial text.
                flags.deny_session = Some(
                    args.next()
                        .ok_or_else(|| {
                            AppError::configuration(
                                "Missing value after --deny-session. Use --deny-session <reason>.",
                            )
                        })?
                        .trim()
                        .to_owned(),
                );
            }
            "--help" | "-h" => flags.help = true,
            value if value.starts_with("--") => {
                return Err(AppError::configuration(format!(
                    "Unknown flag '{value}'. Run with --help for valid flags."
                )));
            }
            unknown => {
                return Err(AppError::configuration(format!(
                    "Unexpected argument '{unknown}'. Run with --help for valid flags."
                )));
            }
        }
    }

    Ok(flags)
}

pub fn print_cli_help() {
    println!("Usage: immersive-player [--config <path>] [--unsupported] [--no-xr-api] [--block-autoplay] [--deny-session <reason>]");
    println!();
    println!("  --config <path>           Load configuration from <path> instead of IMMERSIVE_PLAYER_CONFIG");
    println!("  --unsupported             Simulate a device without immersive VR support");
    println!("  --no-xr-api               Simulate a host without the immersive API");
    println!("  --block-autoplay          Simulate a browser that refuses unmuted autoplay");
    println!("  --deny-session <reason>   Refuse every session request with <reason>");
    println!("  --help                    Show this help message");
    println!();
    println!("Commands (stdin): general <id> | special <id> | clear <general|special> | go | end | status | catalogs | quit");
}

fn read_cli_value(flag: &str, value: String) -> AppResult<String> {
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(AppError::configuration(format!(
            "Flag '{flag}' requires a non-empty value."
        )));
    }
    Ok(value)
}
