use anyhow::Result;
use log::{debug, info};
use std::path::Path;
use std::time::Instant;

use post_archiver::api::{ApiClient, DEFAULT_BASE_URL};
use post_archiver::cli_args::CommandLineArgs;
use post_archiver::downloader::sync_media;
use post_archiver::fetcher::fetch_new;
use post_archiver::renderer::{markdown_lines, render_html, Templates};
use post_archiver::store::Store;

const MEDIA_DIR: &str = "./media";
const OUTPUT_FILE: &str = "index.html";

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let start_time = Instant::now();
    info!("Post Archiver v{} starting up...", env!("CARGO_PKG_VERSION"));

    debug!("Parsing command line arguments...");
    let cli_args = CommandLineArgs::parse_args();

    let mut store = Store::open(Path::new(&cli_args.db))?;
    let since_id = store.max_post_id()?;
    debug!("Watermark: {:?}", since_id);

    // Templates are read up front so a missing file fails the run before
    // any fetch or download work happens.
    let templates = Templates::load(Path::new("."))?;

    let client = ApiClient::new(DEFAULT_BASE_URL, &cli_args.bearer_token)?;
    fetch_new(&client, &mut store, &cli_args.account_id, since_id)?;

    let media_dir = Path::new(MEDIA_DIR);
    sync_media(&store, media_dir)?;

    render_html(&store, &templates, media_dir, Path::new(OUTPUT_FILE))?;

    if cli_args.markdown {
        for line in markdown_lines(&store, media_dir)? {
            println!("{}", line);
        }
    }

    let elapsed = start_time.elapsed();
    info!("Archive run completed in {:.2} seconds", elapsed.as_secs_f64());
    Ok(())
}
