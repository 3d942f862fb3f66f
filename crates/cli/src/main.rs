// Stract is an open source web search engine.
// Copyright (C) 2023 Stract ApS
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crawler::{BlockingHttpDownloaderFactory, CrawlPipeline, ProxySettings};
use webgraph::{AnalysisResult, Graph};

/// `WebGraphBuilder <mode> <workDir> [<url>|<chance>] [<proxyAddr> <proxyPort>] [<proxyUser> <proxyPass>]`
#[derive(Parser)]
#[clap(name = "webgraph-builder", author, version, about, long_about = None)]
struct Args {
    /// One of: crawl, crawl_and_analyze, read_and_analyze, simulate_atack_and_analyze
    mode: String,

    work_dir: PathBuf,

    /// Seed URL for crawl modes, or the deletion chance in [0,1] for simulate_atack_and_analyze
    #[clap(allow_hyphen_values = true)]
    rest: Vec<String>,
}

struct CrawlArgs {
    url: Option<String>,
    chance: Option<f64>,
    proxy: Option<ProxySettings>,
}

fn parse_rest(mode: &str, rest: &[String]) -> Result<CrawlArgs> {
    let wants_chance = mode == "simulate_atack_and_analyze";
    let wants_url = mode == "crawl" || mode == "crawl_and_analyze";

    let (leading, proxy_args) = match rest.len() {
        0 => (None, &rest[..]),
        _ if wants_chance || wants_url => (Some(rest[0].clone()), &rest[1..]),
        _ => (None, &rest[..]),
    };

    let proxy = match proxy_args.len() {
        0 => None,
        2 => Some(ProxySettings {
            addr: proxy_args[0].clone(),
            port: proxy_args[1]
                .parse()
                .context("proxy port must be a valid port number")?,
            user: None,
            password: None,
        }),
        4 => Some(ProxySettings {
            addr: proxy_args[0].clone(),
            port: proxy_args[1]
                .parse()
                .context("proxy port must be a valid port number")?,
            user: Some(proxy_args[2].clone()),
            password: Some(proxy_args[3].clone()),
        }),
        n => bail!("expected 0, 2, or 4 trailing proxy arguments, got {n}"),
    };

    if wants_chance {
        let raw = leading.context("simulate_atack_and_analyze requires a deletion chance")?;
        let chance: f64 = raw.parse().context("deletion chance must be a number")?;
        Ok(CrawlArgs {
            url: None,
            chance: Some(chance),
            proxy,
        })
    } else if wants_url {
        let url = leading.context("crawl modes require a seed url")?;
        Ok(CrawlArgs {
            url: Some(url),
            chance: None,
            proxy,
        })
    } else {
        Ok(CrawlArgs {
            url: None,
            chance: None,
            proxy,
        })
    }
}

fn graph_path(work_dir: &std::path::Path) -> PathBuf {
    work_dir.join("graph.graphml")
}

fn analysis_path(work_dir: &std::path::Path) -> PathBuf {
    work_dir.join("analysisResult.txt")
}

fn write_analysis(result: &AnalysisResult, work_dir: &std::path::Path) -> Result<()> {
    let body = format!(
        "edgesIndex: {}\nlinksIndex: {}\nclusteringCoeff: {}\ninductors: {}\ncollectors: {}\nmediators: {}\n",
        result.edges_index,
        result.links_index,
        result.clustering_coeff,
        result.classes.inductors,
        result.classes.collectors,
        result.classes.mediators,
    );
    std::fs::write(analysis_path(work_dir), body)
        .with_context(|| format!("writing analysis result to {}", work_dir.display()))
}

fn run_crawl(work_dir: &std::path::Path, crawl_args: &CrawlArgs) -> Result<Graph> {
    let url = crawl_args
        .url
        .as_deref()
        .context("crawl modes require a seed url")?;

    let factory = BlockingHttpDownloaderFactory;
    let pipeline = CrawlPipeline::construct(&factory, num_cpus())?;

    if let Some(proxy) = &crawl_args.proxy {
        pipeline.set_proxy(proxy);
    }

    let rx = pipeline.start(url)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let graph = runtime.block_on(rx)??;

    std::fs::create_dir_all(work_dir)
        .with_context(|| format!("creating work directory {}", work_dir.display()))?;
    webgraph::serialize(&graph, graph_path(work_dir))?;

    Ok(graph)
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn run(args: Args) -> Result<()> {
    let crawl_args = parse_rest(&args.mode, &args.rest)?;

    match args.mode.as_str() {
        "crawl" => {
            run_crawl(&args.work_dir, &crawl_args)?;
        }
        "crawl_and_analyze" => {
            let graph = run_crawl(&args.work_dir, &crawl_args)?;
            let result = webgraph::analyze(&graph);
            write_analysis(&result, &args.work_dir)?;
        }
        "read_and_analyze" => {
            let graph = webgraph::deserialize(graph_path(&args.work_dir))?;
            let result = webgraph::analyze(&graph);
            write_analysis(&result, &args.work_dir)?;
        }
        "simulate_atack_and_analyze" => {
            let chance = crawl_args
                .chance
                .context("simulate_atack_and_analyze requires a deletion chance")?;
            let mut graph = webgraph::deserialize(graph_path(&args.work_dir))?;
            webgraph::simulate_nodes_deletion(&mut graph, chance)?;
            let result = webgraph::analyze(&graph);
            write_analysis(&result, &args.work_dir)?;
        }
        other => bail!("unknown mode: {other}"),
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .finish()
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    };

    if let Err(e) = run(args) {
        tracing::error!("{e:#}");
    }
}
