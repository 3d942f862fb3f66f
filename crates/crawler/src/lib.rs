//! Single-domain crawl pipeline: downloads pages, normalizes and filters
//! their hrefs, and grows a [`webgraph::Graph`] until the frontier runs dry.

mod downloader;
mod error;
mod extractor;
mod pipeline;

pub use downloader::{
    BlockingHttpDownloader, BlockingHttpDownloaderFactory, ProxySettings, WebPageDownloader,
    WebPageDownloaderFactory,
};
pub use error::{Error, Result};
pub use extractor::extract_and_filter_links;
pub use pipeline::CrawlPipeline;
