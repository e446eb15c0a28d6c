use std::env;
use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use fs_err as fs;
use quex_crawler::{crawl_site, CrawlerConfig};
use quex_scraper::{scrap_page, QuestionScraper, QuestionScraperConfig};
use tokio::runtime;

/// Harvest question records from a paginated listing site
#[derive(Debug, Parser)]
#[command(name = "quex", version)]
struct Args {
    #[command(subcommand)]
    cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
enum SubCommand {
    /// Crawl the paginated index and write question records as CSV
    Crawl(CrawlArgs),
    /// Scrap a single page and write its records to stdout
    Scrap(ScrapArgs),
    /// Generate a bash completion script
    #[command(hide = true)]
    Completion,
}

#[derive(Debug, clap::Args)]
struct CrawlArgs {
    /// First index page to fetch
    #[arg(long, default_value_t = 1)]
    start_page: usize,

    /// Last index page to fetch, inclusive
    #[arg(long, default_value_t = 5)]
    end_page: usize,

    /// Base URL of the target site
    #[arg(long)]
    base_url: Option<String>,

    /// Keep index records as-is instead of enriching them through
    /// detail pages
    #[arg(long)]
    no_detail: bool,

    /// Path of the question records csv file (stdout when omitted)
    #[arg(long, short)]
    output_file: Option<PathBuf>,

    /// Path of the failure records csv file (derived from the output
    /// file, or stderr, when omitted)
    #[arg(long)]
    failures_file: Option<PathBuf>,

    /// Optional crawler yaml configuration file
    #[arg(long, env = "QUEX_CRAWLER_CONFIG")]
    crawler_config: Option<PathBuf>,

    /// Override crawler's user agent
    #[arg(long)]
    user_agent: Option<String>,

    /// Bearer token attached, along with browser-like headers, to every
    /// request
    #[arg(long, env = "QUEX_BEARER_TOKEN")]
    bearer_token: Option<String>,

    /// Raw cookie header value attached to every request
    #[arg(long)]
    cookies: Option<String>,

    /// Proxy URL for all requests
    #[arg(long)]
    proxy: Option<String>,

    /// Override crawler's maximum concurrent downloads
    #[arg(long)]
    concurrent_downloads: Option<usize>,

    /// Override crawler's number of scraper workers
    #[arg(long)]
    num_workers: Option<usize>,

    /// Override crawler's fixed delay before each request, in
    /// milliseconds
    #[arg(long)]
    request_delay_ms: Option<u64>,

    /// Override crawler's retry budget per request
    #[arg(long)]
    max_retries: Option<usize>,

    /// No SIGINT handling
    #[arg(long)]
    no_sigint: bool,

    /// When quiet no logs are outputted
    #[arg(long, short)]
    quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut config: CrawlerConfig = match &args.crawler_config {
            Some(path) => serde_yaml::from_reader(fs::File::open(path)?)?,
            None => CrawlerConfig::default(),
        };
        if let Some(user_agent) = &args.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(bearer_token) = &args.bearer_token {
            config.bearer_token = Some(bearer_token.clone());
        }
        if let Some(cookies) = &args.cookies {
            config.cookies = Some(cookies.clone());
        }
        if let Some(proxy) = &args.proxy {
            config.proxy = Some(proxy.clone());
        }
        if let Some(concurrent_downloads) = args.concurrent_downloads {
            config.concurrent_downloads = concurrent_downloads;
        }
        if let Some(num_workers) = args.num_workers {
            config.num_workers = num_workers;
        }
        if let Some(request_delay_ms) = args.request_delay_ms {
            config.request_delay_ms = request_delay_ms;
        }
        if let Some(max_retries) = args.max_retries {
            config.max_retries = max_retries;
        }
        if args.no_sigint {
            config.handle_sigint = false;
        }
        Ok(config)
    }
}

fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let crawler_config = CrawlerConfig::try_from(&args)?;
    let mut scraper_config = QuestionScraperConfig {
        start_page: args.start_page,
        end_page: args.end_page,
        fetch_detail_meta: !args.no_detail,
        csv_file: args.output_file,
        failures_file: args.failures_file,
        ..Default::default()
    };
    if let Some(base_url) = args.base_url {
        scraper_config.base_url = base_url;
    }
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(crawl_site::<QuestionScraper>(
        &crawler_config,
        &scraper_config,
    ))
}

#[derive(Debug, clap::Args)]
struct ScrapArgs {
    /// A local html page to scrap
    #[arg(long, conflicts_with = "url")]
    file: Option<PathBuf>,

    /// A distant html page to scrap
    #[arg(long)]
    url: Option<String>,

    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    user_agent: Option<String>,

    /// Base URL used to resolve relative links
    #[arg(long)]
    base_url: Option<String>,
}

fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let (page, url) = if let Some(url) = args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(user_agent) = args.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let page = builder.build()?.get(&url).send()?.error_for_status()?.text()?;
        (page, Some(url))
    } else if let Some(path) = args.file {
        (fs::read_to_string(path)?, None)
    } else {
        anyhow::bail!("Missing `url` or `file`");
    };

    let mut config = QuestionScraperConfig::default();
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    scrap_page(&config, page, url)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                if env::var("RUST_LOG").is_err() {
                    env::set_var("RUST_LOG", "quex_crawler=info,quex_scraper=info");
                }
                env_logger::init();
            }
            crawl(args)
        }
        SubCommand::Scrap(args) => {
            if env::var("RUST_LOG").is_err() {
                env::set_var("RUST_LOG", "quex_scraper=warn");
            }
            env_logger::init();
            scrap(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "quex", &mut io::stdout());
            Ok(())
        }
    }
}
