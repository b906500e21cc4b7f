pub mod api;
pub mod cli_args;
pub mod downloader;
pub mod fetcher;
pub mod renderer;
pub mod store;
pub mod template;
