use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CommandLineArgs {
    #[arg(short = 'b', long, help = "Bearer token for the posts API")]
    pub bearer_token: String,

    #[arg(short = 'i', long, help = "Identifier of the account to archive")]
    pub account_id: String,

    #[arg(short = 'd', long, help = "Path to the archive database file")]
    pub db: String,

    #[arg(
        long,
        help = "Also print the archive as a markdown listing after rendering"
    )]
    pub markdown: bool,
}

impl CommandLineArgs {
    pub fn parse_args() -> Self {
        let args = CommandLineArgs::parse();

        info!("Archiving account {}", args.account_id);
        info!("Using database file {}", args.db);

        args
    }
}
