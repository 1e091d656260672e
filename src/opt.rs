use clap::Parser;

#[derive(Clone, Debug, Parser)]
#[command(name = "todo-api", about = "Cookie-session todo list service")]
pub struct Opt {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    pub config: std::path::PathBuf,
}
