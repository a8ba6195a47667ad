use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::{info, warn};

use k9rs_core::{is_crd, is_k9s_meta, is_scalable, Config, Gvr, ResourceMeta, ALL_NAMESPACES};
use k9rs_dao::{accessor_for, extract_meta, meta_from_crd, ListOptions, Meta};
use k9rs_kubehub::{Factory, KubeFactory};

#[derive(Parser, Debug)]
#[command(name = "k9rsctl", version, about = "k9rs resource registry CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: all namespaces)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refresh the catalog and list every known resource type
    Resources,
    /// Show the descriptor of one type, e.g. "apps/v1/deployments"
    Meta {
        gvr: String,
    },
    /// Resolve a group/version/kind key, e.g. "apps/v1/Deployment" or "v1/Pod"
    Gvk {
        key: String,
    },
    /// Parse a CustomResourceDefinition manifest (YAML or JSON)
    Extract {
        file: std::path::PathBuf,
    },
    /// Show which accessor serves a type
    Accessor {
        gvr: String,
    },
    /// List instances of a type through its accessor
    Ls {
        gvr: String,
        /// Parent path, e.g. "default/nginx" for containers or a directory for "dir"
        #[arg(long = "path")]
        path: Option<String>,
        /// Label selector
        #[arg(short = 'l', long = "selector", default_value = "")]
        selector: String,
    },
}

fn init_tracing() {
    let env = std::env::var("K9RS_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("K9RS_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid K9RS_METRICS_ADDR; expected host:port");
        }
    }
}

fn parse_gvk(key: &str) -> Option<(String, String, String)> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Some((String::new(), (*version).to_string(), (*kind).to_string())),
        [group, version, kind] => Some(((*group).to_string(), (*version).to_string(), (*kind).to_string())),
        _ => None,
    }
}

async fn loaded(factory: &dyn Factory) -> Result<Meta> {
    let meta = Meta::new();
    meta.load_resources(factory).await.context("loading resource catalog")?;
    Ok(meta)
}

fn badges(m: &ResourceMeta) -> String {
    let mut out = Vec::new();
    if is_crd(m) { out.push("crd"); }
    if is_k9s_meta(m) { out.push("k9s"); }
    if m.has_category(k9rs_core::HELM_CAT) { out.push("helm"); }
    if is_scalable(m) { out.push("scale"); }
    out.join(",")
}

fn print_meta(output: Output, gvr: &Gvr, m: &ResourceMeta) -> Result<()> {
    match output {
        Output::Human => {
            let scope = if m.namespaced { "namespaced" } else { "cluster" };
            println!("{:<50} {:<28} {:<10} {}", gvr.to_string(), m.kind, scope, badges(m));
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(m)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let config = Config::from_env();
    let ns = cli.namespace.clone().unwrap_or_else(|| ALL_NAMESPACES.to_string());

    match cli.command {
        Commands::Resources => {
            let factory = KubeFactory::connect(config).await;
            let meta = loaded(&factory).await?;
            let mut all = Vec::new();
            for gvr in meta.all_gvrs().await {
                let m = meta.meta_for(&gvr).await?;
                all.push((gvr, m));
            }
            match cli.output {
                Output::Human => {
                    for (gvr, m) in &all {
                        print_meta(Output::Human, gvr, m)?;
                    }
                }
                Output::Json => {
                    let map: std::collections::BTreeMap<String, &ResourceMeta> =
                        all.iter().map(|(g, m)| (g.to_string(), m)).collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
            }
        }
        Commands::Meta { gvr } => {
            let gvr: Gvr = gvr.parse()?;
            let factory = KubeFactory::connect(config).await;
            let meta = loaded(&factory).await?;
            let m = meta.meta_for(&gvr).await?;
            print_meta(cli.output, &gvr, &m)?;
        }
        Commands::Gvk { key } => {
            let (group, version, kind) =
                parse_gvk(&key).ok_or_else(|| anyhow!("expected version/Kind or group/version/Kind, got {key:?}"))?;
            let factory = KubeFactory::connect(config).await;
            let meta = loaded(&factory).await?;
            match meta.gvk2gvr(&group, &version, &kind).await {
                Some((gvr, namespaced)) => match cli.output {
                    Output::Human => println!("{gvr} {}", if namespaced { "namespaced" } else { "cluster" }),
                    Output::Json => println!("{}", serde_json::json!({"gvr": gvr.to_string(), "namespaced": namespaced})),
                },
                None => return Err(anyhow!("no resource type for {key}")),
            }
        }
        Commands::Extract { file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let value: serde_json::Value = serde_yaml::from_str(&raw).context("parsing manifest")?;
            let typed = serde_json::from_value::<CustomResourceDefinition>(value.clone()).ok();
            let m = match typed.as_ref().and_then(meta_from_crd) {
                Some(m) => m,
                None => {
                    let (m, errs) = extract_meta(&value);
                    for e in &errs {
                        warn!(error = %e, "extraction problem");
                    }
                    m
                }
            };
            print_meta(cli.output, &Gvr::from_meta(&m), &m)?;
        }
        Commands::Accessor { gvr } => {
            let gvr: Gvr = gvr.parse()?;
            let factory: Arc<dyn Factory> = Arc::new(KubeFactory::with_connection(None, config));
            let a = accessor_for(factory, &gvr)?;
            let caps = [("delete", a.nuker().is_some()), ("scale", a.scalable().is_some())];
            let caps: Vec<&str> = caps.iter().filter(|(_, on)| *on).map(|(c, _)| *c).collect();
            match cli.output {
                Output::Human => println!("{gvr} {} [{}]", a.kind(), caps.join(",")),
                Output::Json => println!("{}", serde_json::json!({"gvr": gvr.to_string(), "accessor": a.kind(), "capabilities": caps})),
            }
        }
        Commands::Ls { gvr, path, selector } => {
            let gvr: Gvr = gvr.parse()?;
            info!(gvr = %gvr, ns = %ns, "ls invoked");
            let factory: Arc<dyn Factory> = Arc::new(KubeFactory::connect(config).await);
            let a = accessor_for(factory, &gvr)?;
            let mut opts = ListOptions::namespace(&ns).with_labels(&selector);
            if let Some(p) = path.as_deref() {
                opts = opts.with_path(p);
            }
            let items = a.list(&opts).await?;
            match cli.output {
                Output::Human => {
                    println!("{:<20} {:<40} AGE", "NAMESPACE", "NAME");
                    for o in &items {
                        let ns_col = o.metadata.namespace.clone().unwrap_or_else(|| "-".to_string());
                        let name = o.metadata.name.clone().unwrap_or_default();
                        let age = o.metadata.creation_timestamp.as_ref().map(|t| t.0.timestamp()).unwrap_or(0);
                        println!("{:<20} {:<40} {}", ns_col, name, render_age(age));
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&items)?),
            }
        }
    }

    Ok(())
}

fn render_age(creation_ts: i64) -> String {
    if creation_ts <= 0 { return "-".to_string(); }
    let now = chrono::Utc::now().timestamp();
    let mut secs = (now - creation_ts).max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvk_keys() {
        assert_eq!(parse_gvk("v1/Pod"), Some(("".into(), "v1".into(), "Pod".into())));
        assert_eq!(parse_gvk("apps/v1/Deployment"), Some(("apps".into(), "v1".into(), "Deployment".into())));
        assert_eq!(parse_gvk("Pod"), None);
    }

    #[test]
    fn badges_follow_categories() {
        let m = ResourceMeta { categories: k9rs_core::string_set(&["crd", "scale"]), ..Default::default() };
        assert_eq!(badges(&m), "crd,scale");
        assert_eq!(render_age(0), "-");
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["k9rsctl", "--ns", "kube-system", "-o", "json", "ls", "v1/pods", "-l", "app=dns"])
            .expect("parse");
        assert_eq!(cli.output, Output::Json);
        assert_eq!(cli.namespace.as_deref(), Some("kube-system"));
        assert!(matches!(cli.command, Commands::Ls { ref selector, .. } if selector == "app=dns"));
    }
}
