use std::ffi::OsString;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use fnv::FnvHasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use spine_salvage_core::{
    BundleText, CorrelateConfig, DEFAULT_IMAGES_PATH, DESCRIPTOR_PROBE_OFFSETS, DecodedImage,
    ResolvedAsset, SalvageReport, correlate, normalize_spine_version,
};
use tracing::{error, info, warn};
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0";

#[derive(Parser, Debug)]
#[command(
    name = "spine-salvage",
    about = "Rip Spine animation assets out of minified web bundles",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress=false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a page, discover its bundle and rip every embedded asset
    Rip(RipArgs),
    /// Run extraction against an already saved bundle file
    Scan(ScanArgs),
}

#[derive(Parser, Debug, Clone)]
struct RipArgs {
    // Input/Output
    /// URL of the page that loads the bundle
    #[arg(help_heading = "Input/Output")]
    url: Url,
    /// Output directory (a work dir named after the page title is created inside)
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Keep the fetched bundle as vendors.js inside the work dir
    #[arg(long, default_value_t = false, help_heading = "Input/Output")]
    keep_bundle: bool,
    /// Only persist assets whose project name matches any of these globs
    #[arg(long, help_heading = "Input/Output")]
    only: Vec<String>,

    // Correlation
    /// Descriptor probe offsets, tried in order
    #[arg(long, value_delimiter = ',', default_values_t = DESCRIPTOR_PROBE_OFFSETS, help_heading = "Correlation")]
    offsets: Vec<usize>,
    /// Images path written into each recovered skeleton document
    #[arg(long, default_value = DEFAULT_IMAGES_PATH, help_heading = "Correlation")]
    images_path: String,

    // Network
    /// User-Agent header for page/bundle/texture requests
    #[arg(long, default_value = DEFAULT_USER_AGENT, help_heading = "Network")]
    user_agent: String,

    // Conversion
    /// Drive the external Spine tool for each ripped asset
    #[arg(long, default_value_t = false, help_heading = "Conversion")]
    convert: bool,
    /// Path to the Spine console binary (spine.com / spine)
    #[arg(long, help_heading = "Conversion")]
    spine_com: Option<PathBuf>,
    /// Proxy host:port handed to the Spine tool
    #[arg(long, help_heading = "Conversion")]
    proxy: Option<String>,
    /// YAML config file for conversion settings (flags win over file values)
    #[arg(long, help_heading = "Conversion")]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
struct ScanArgs {
    /// Previously saved bundle file (vendors.js)
    #[arg(help_heading = "Input/Output")]
    bundle: PathBuf,
    /// Document base URL the bundle was served under
    #[arg(long, help_heading = "Input/Output")]
    base_url: Url,
    /// Output directory (a work dir named after the bundle file is created inside)
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Only persist assets whose project name matches any of these globs
    #[arg(long, help_heading = "Input/Output")]
    only: Vec<String>,
    /// Download resolved page textures (requires network)
    #[arg(long, default_value_t = false, help_heading = "Input/Output")]
    download: bool,

    // Correlation
    /// Descriptor probe offsets, tried in order
    #[arg(long, value_delimiter = ',', default_values_t = DESCRIPTOR_PROBE_OFFSETS, help_heading = "Correlation")]
    offsets: Vec<usize>,
    /// Images path written into each recovered skeleton document
    #[arg(long, default_value = DEFAULT_IMAGES_PATH, help_heading = "Correlation")]
    images_path: String,

    // Network
    /// User-Agent header for texture requests
    #[arg(long, default_value = DEFAULT_USER_AGENT, help_heading = "Network")]
    user_agent: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Rip(args) => run_rip(args, cli.progress && !cli.quiet),
        Commands::Scan(args) => run_scan(args, cli.progress && !cli.quiet),
    }
}

fn run_rip(cli: &RipArgs, show_progress: bool) -> anyhow::Result<()> {
    let convert_cfg = load_convert_config(cli.config.as_deref())?
        .merged_with_flags(cli.spine_com.clone(), cli.proxy.clone());
    if cli.convert && convert_cfg.spine_com.is_none() {
        anyhow::bail!("--convert needs --spine-com or a config file naming the Spine binary");
    }
    let only = build_globset(&cli.only)?;

    let client = build_client(&cli.user_agent)?;
    info!(url = %cli.url, "fetching page");
    let page_html = fetch_text(&client, &cli.url)?;
    let (title, bundle_url) = discover_bundle(&page_html, &cli.url)?;
    info!(title = %title, bundle = %bundle_url, "bundle discovered");

    let work_dir = cli.out_dir.join(sanitize_title(&title));
    reset_dir(&work_dir)?;

    let raw = fetch_text(&client, &bundle_url)?;
    if cli.keep_bundle {
        let bundle_path = work_dir.join("vendors.js");
        fs::write(&bundle_path, &raw)
            .with_context(|| format!("write {}", bundle_path.display()))?;
        info!(path = %bundle_path.display(), "bundle kept");
    }

    let bundle = BundleText::flatten(&raw);
    let cfg = CorrelateConfig {
        descriptor_offsets: cli.offsets.clone(),
        images_path: cli.images_path.clone(),
        cancel: None,
    };
    let report = correlate(&bundle, &cli.url, &cfg).context("bundle extraction failed")?;
    info!("{}", report.summary());

    persist_report(&work_dir, &report, only.as_ref(), Some(&client), show_progress)?;

    if cli.convert {
        convert_assets(&work_dir, &report, only.as_ref(), &convert_cfg);
    }
    Ok(())
}

fn run_scan(cli: &ScanArgs, show_progress: bool) -> anyhow::Result<()> {
    let only = build_globset(&cli.only)?;
    let raw = fs::read_to_string(&cli.bundle)
        .with_context(|| format!("read {}", cli.bundle.display()))?;

    let bundle = BundleText::flatten(&raw);
    let cfg = CorrelateConfig {
        descriptor_offsets: cli.offsets.clone(),
        images_path: cli.images_path.clone(),
        cancel: None,
    };
    let report = correlate(&bundle, &cli.base_url, &cfg).context("bundle extraction failed")?;
    info!("{}", report.summary());

    let stem = cli
        .bundle
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bundle");
    let work_dir = cli.out_dir.join(sanitize_title(stem));
    reset_dir(&work_dir)?;

    // offline mode: a client exists only when textures were asked for
    let client = if cli.download {
        Some(build_client(&cli.user_agent)?)
    } else {
        None
    };
    persist_report(&work_dir, &report, only.as_ref(), client.as_ref(), show_progress)?;
    Ok(())
}

/// Writes every asset and the harvested inline images under `work_dir`.
/// Page textures are downloaded only when a client is supplied.
fn persist_report(
    work_dir: &Path,
    report: &SalvageReport,
    only: Option<&GlobSet>,
    client: Option<&Client>,
    show_progress: bool,
) -> anyhow::Result<()> {
    for asset in &report.assets {
        let Some(project) = asset.project_name() else {
            continue;
        };
        if only.is_some_and(|globs| !globs.is_match(project)) {
            info!(project = %project, "filtered out by --only");
            continue;
        }
        let dir = persist_asset(work_dir, asset)?;
        if let Some(client) = client {
            let saved = download_textures(client, &dir, asset, show_progress)?;
            info!(project = %project, textures = saved, "textures downloaded");
        }
    }
    let inline = write_inline_images(work_dir, &report.inline_images)?;
    if inline > 0 {
        info!(count = inline, "inline images saved under base64Images/");
    }
    Ok(())
}

fn build_client(user_agent: &str) -> anyhow::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .build()
        .context("build http client")
}

fn fetch_text(client: &Client, url: &Url) -> anyhow::Result<String> {
    let resp = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("GET {url}"))?;
    resp.text().with_context(|| format!("read body of {url}"))
}

fn fetch_bytes(client: &Client, url: &Url) -> anyhow::Result<Vec<u8>> {
    let resp = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("GET {url}"))?;
    Ok(resp
        .bytes()
        .with_context(|| format!("read body of {url}"))?
        .to_vec())
}

/// Reads the page title (work dir name) and the src of the first script tag
/// whose src mentions `vendors`, resolved against the page URL. Either one
/// missing is fatal; unfamiliar pages fail closed.
fn discover_bundle(html: &str, page_url: &Url) -> anyhow::Result<(String, Url)> {
    let doc = Html::parse_document(html);
    let title_sel = Selector::parse("title").unwrap();
    let title = doc
        .select(&title_sel)
        .next()
        .map(|t| t.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .context("page has no usable <title>")?;
    let script_sel = Selector::parse("script[src]").unwrap();
    let src = doc
        .select(&script_sel)
        .filter_map(|s| s.value().attr("src"))
        .find(|src| src.contains("vendors"))
        .context("no script tag with a vendors bundle src")?;
    let bundle_url = page_url
        .join(src)
        .with_context(|| format!("resolve bundle src {src}"))?;
    Ok((title, bundle_url))
}

fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.');
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

fn reset_dir(dir: &Path) -> anyhow::Result<()> {
    if dir.is_dir() {
        fs::remove_dir_all(dir).with_context(|| format!("clear {}", dir.display()))?;
    }
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))
}

fn persist_asset(work_dir: &Path, asset: &ResolvedAsset) -> anyhow::Result<PathBuf> {
    let project = asset.project_name().context("asset has no pages")?;
    let dir = work_dir.join(project);
    reset_dir(&dir)?;

    let atlas_path = dir.join(format!("{project}.atlas"));
    fs::write(&atlas_path, &asset.content.raw_text)
        .with_context(|| format!("write {}", atlas_path.display()))?;

    let json_path = dir.join(format!("{project}.json"));
    let json = serde_json::to_string_pretty(asset.content.skeleton.as_value())?;
    fs::write(&json_path, json).with_context(|| format!("write {}", json_path.display()))?;

    info!(project = %project, dir = %dir.display(), "atlas and skeleton written");
    Ok(dir)
}

fn download_textures(
    client: &Client,
    dir: &Path,
    asset: &ResolvedAsset,
    progress: bool,
) -> anyhow::Result<usize> {
    if asset.textures.is_empty() {
        return Ok(0);
    }
    let bar = if progress {
        let b = ProgressBar::new(asset.textures.len() as u64);
        b.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} textures {pos}/{len} [{elapsed_precise}] {wide_msg}",
            )
            .unwrap(),
        );
        Some(b)
    } else {
        None
    };
    let mut saved = 0usize;
    for page in &asset.content.pages {
        let Some(url) = &page.texture else {
            continue;
        };
        if let Some(b) = &bar {
            b.set_message(page.name.clone());
        }
        match fetch_bytes(client, url) {
            Ok(bytes) => {
                let path = dir.join(format!("{}.png", page.name));
                fs::write(&path, &bytes).with_context(|| format!("write {}", path.display()))?;
                saved += 1;
            }
            Err(e) => {
                error!(page = %page.name, error = %e, "texture download failed");
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    Ok(saved)
}

fn write_inline_images(work_dir: &Path, images: &[DecodedImage]) -> anyhow::Result<usize> {
    if images.is_empty() {
        return Ok(0);
    }
    let dir = work_dir.join("base64Images");
    reset_dir(&dir)?;
    let mut saved = 0usize;
    for img in images {
        if let Err(e) = image::load_from_memory(&img.bytes) {
            warn!(
                bytes = img.bytes.len(),
                error = %e,
                "inline payload is not a decodable image, skipping"
            );
            continue;
        }
        let path = dir.join(format!("{}.png", content_key(&img.bytes)));
        fs::write(&path, &img.bytes).with_context(|| format!("write {}", path.display()))?;
        saved += 1;
    }
    Ok(saved)
}

// Content-hash filenames so identical payloads collapse to one file.
fn content_key(bytes: &[u8]) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    format!("{:016x}", hasher.finish())
}

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat)?);
    }
    Ok(Some(b.build()?))
}

fn convert_assets(
    work_dir: &Path,
    report: &SalvageReport,
    only: Option<&GlobSet>,
    cfg: &ConvertConfig,
) {
    let Some(spine_com) = cfg.spine_com.as_deref() else {
        return;
    };
    for asset in &report.assets {
        let Some(project) = asset.project_name() else {
            continue;
        };
        if only.is_some_and(|globs| !globs.is_match(project)) {
            continue;
        }
        if let Err(e) = convert_asset(spine_com, cfg.proxy.as_deref(), work_dir, asset) {
            error!(project = %project, error = %e, "conversion failed");
        }
    }
}

/// Unpacks the downloaded page textures back into region images and
/// assembles a .spine project, both through the external Spine console
/// binary. The tool drops region PNGs next to the atlas; they are collected
/// into out/images afterwards, missing ones ignored (unresolved pages never
/// produced them).
fn convert_asset(
    spine_com: &Path,
    proxy: Option<&str>,
    work_dir: &Path,
    asset: &ResolvedAsset,
) -> anyhow::Result<()> {
    let Some(project) = asset.project_name() else {
        return Ok(());
    };
    let version = asset
        .content
        .skeleton
        .spine_version()
        .context("skeleton document has no spine version")?;
    let version = normalize_spine_version(version);

    let project_dir = work_dir.join(project);
    let atlas_file = project_dir.join(format!("{project}.atlas"));
    let json_file = project_dir.join(format!("{project}.json"));
    let out_dir = project_dir.join("out");
    reset_dir(&out_dir)?;
    let images_dir = out_dir.join("images");
    reset_dir(&images_dir)?;

    let unpack = unpack_args(proxy, version, &project_dir, &atlas_file);
    run_spine_tool(spine_com, &unpack).context("unpack textures")?;

    let mut moved = 0usize;
    for page in &asset.content.pages {
        for region in &page.regions {
            let from = project_dir.join(format!("{}.png", region.name));
            let to = images_dir.join(format!("{}.png", region.name));
            match fs::rename(&from, &to) {
                Ok(()) => moved += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("move {}", from.display()));
                }
            }
        }
    }

    let spine_file = out_dir.join("project.spine");
    let assemble = assemble_args(
        proxy,
        version,
        &project_dir,
        &spine_file,
        asset.content.scale,
        &json_file,
    );
    run_spine_tool(spine_com, &assemble).context("assemble project")?;
    info!(project = %project, regions = moved, out = %spine_file.display(), "project assembled");
    Ok(())
}

fn unpack_args(
    proxy: Option<&str>,
    version: &str,
    input_dir: &Path,
    atlas_file: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if let Some(proxy) = proxy {
        args.push("-x".into());
        args.push(proxy.into());
    }
    args.push("-u".into());
    args.push(version.into());
    args.push("-i".into());
    args.push(input_dir.into());
    args.push("-o".into());
    args.push(input_dir.into());
    args.push("-c".into());
    args.push(atlas_file.into());
    args
}

fn assemble_args(
    proxy: Option<&str>,
    version: &str,
    input_dir: &Path,
    spine_file: &Path,
    scale: f32,
    json_file: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if let Some(proxy) = proxy {
        args.push("-x".into());
        args.push(proxy.into());
    }
    args.push("-u".into());
    args.push(version.into());
    args.push("-i".into());
    args.push(input_dir.into());
    args.push("-o".into());
    args.push(spine_file.into());
    args.push("-s".into());
    // keep the trailing .0 the way the tool expects whole scales
    args.push(format!("{scale:?}").into());
    args.push("-r".into());
    args.push(json_file.into());
    args
}

fn run_spine_tool(spine_com: &Path, args: &[OsString]) -> anyhow::Result<()> {
    let status = Command::new(spine_com)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("launch {}", spine_com.display()))?;
    if !status.success() {
        anyhow::bail!("{} exited with {status}", spine_com.display());
    }
    Ok(())
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Deserialize, Default)]
struct ConvertConfig {
    spine_com: Option<PathBuf>,
    proxy: Option<String>,
}

impl ConvertConfig {
    fn merged_with_flags(self, spine_com: Option<PathBuf>, proxy: Option<String>) -> Self {
        Self {
            spine_com: spine_com.or(self.spine_com),
            proxy: proxy.or(self.proxy),
        }
    }
}

fn load_convert_config(path: Option<&Path>) -> anyhow::Result<ConvertConfig> {
    let Some(path) = path else {
        return Ok(ConvertConfig::default());
    };
    let file = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConvertConfig =
        serde_yaml::from_str(&file).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
