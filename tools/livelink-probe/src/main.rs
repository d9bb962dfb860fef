// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! livelink-probe - Discover livelink providers on the network
//!
//! Lists providers answering discovery pings and, with `--connect`, links to
//! each one and shows its subjects.

use clap::Parser;
use colored::*;
use livelink::{
    LinkCollection, LinkConfig, LinkContext, LinkId, ProviderDescriptor, UdpTransport,
    UdpTransportConfig,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(100);

/// Discover livelink providers
#[derive(Parser, Debug)]
#[command(name = "livelink-probe")]
#[command(version = "0.1.0")]
#[command(about = "Discover livelink providers and inspect their subjects")]
struct Args {
    /// Discovery port
    #[arg(short, long, default_value = "7425")]
    port: u16,

    /// Extra unicast discovery targets (repeatable)
    #[arg(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Disable broadcast discovery
    #[arg(long)]
    no_broadcast: bool,

    /// Discovery duration in seconds
    #[arg(long, default_value = "3")]
    timeout: u64,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Continuous monitoring mode (refresh every N seconds)
    #[arg(short = 'w', long)]
    watch: Option<u64>,

    /// Only show providers whose name contains this
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Connect to each provider and list its subjects
    #[arg(short = 'c', long)]
    connect: bool,

    /// Quiet mode - compact output
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

struct SubjectView {
    name: String,
    role: String,
    buffered: usize,
    values: Vec<f32>,
}

struct LinkView {
    status: &'static str,
    messages: u64,
    clock_offset: f64,
    subjects: Vec<SubjectView>,
}

struct ProviderView {
    descriptor: ProviderDescriptor,
    link: Option<LinkView>,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    // Setup Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    if !args.quiet {
        eprintln!(
            "{} Provider probe (port={})",
            ">>>".green().bold(),
            args.port
        );
    }

    let transport = UdpTransport::new(UdpTransportConfig {
        discovery_port: args.port,
        broadcast: !args.no_broadcast,
        peers: args.peers.clone(),
        ..Default::default()
    });
    let ctx = LinkContext::builder(Arc::new(transport))
        .config(LinkConfig::default())
        .build()?;
    let interest = ctx.discovery().subscribe();
    ctx.start()?;

    if !args.quiet {
        eprintln!(
            "{}",
            format!("    Discovering for {} seconds...", args.timeout).dimmed()
        );
    }

    if let Some(watch_interval) = args.watch {
        // Continuous watch mode
        let window = Duration::from_secs(watch_interval.max(1));
        while running.load(Ordering::SeqCst) {
            let views = probe(&ctx, args, window, &running);
            print!("\x1B[2J\x1B[1;1H"); // Clear screen
            print_views(&views, args)?;
        }
    } else {
        let window = Duration::from_secs(args.timeout.max(1));
        let views = probe(&ctx, args, window, &running);
        print_views(&views, args)?;
    }

    interest.release();
    ctx.stop();
    Ok(())
}

/// Collect answers for `window`, then optionally connect to each provider.
fn probe(
    ctx: &LinkContext,
    args: &Args,
    window: Duration,
    running: &AtomicBool,
) -> Vec<ProviderView> {
    // results reset every ping cycle, so merge them as they arrive
    let mut found: BTreeMap<String, ProviderDescriptor> = BTreeMap::new();
    let deadline = Instant::now() + window;
    while Instant::now() < deadline && running.load(Ordering::SeqCst) {
        for descriptor in ctx.discovery().results() {
            let matches = args
                .name
                .as_ref()
                .map_or(true, |filter| descriptor.display_name.contains(filter));
            if matches {
                found.insert(descriptor.address.to_string(), descriptor);
            }
        }
        std::thread::sleep(POLL);
    }

    let descriptors: Vec<ProviderDescriptor> = found.into_values().collect();
    if !args.connect {
        return descriptors
            .into_iter()
            .map(|descriptor| ProviderView {
                descriptor,
                link: None,
            })
            .collect();
    }

    let links = LinkCollection::new();
    let ids: Vec<Option<LinkId>> = descriptors
        .iter()
        .map(|d| {
            ctx.connect_link(d.address.clone(), &d.display_name)
                .map(|link| links.add(link))
                .ok()
        })
        .collect();

    // give replays a moment to land
    let settle = Instant::now() + Duration::from_secs(1);
    while Instant::now() < settle && running.load(Ordering::SeqCst) {
        links.tick();
        std::thread::sleep(POLL);
    }

    descriptors
        .into_iter()
        .zip(ids)
        .map(|(descriptor, id)| {
            let link = id.and_then(|id| links.with_link(id, |m| LinkView {
                status: m.status(),
                messages: m.messages_received(),
                clock_offset: m.clock_offset(),
                subjects: m
                    .subjects()
                    .into_iter()
                    .map(|key| {
                        let name = key.subject_name;
                        SubjectView {
                            role: m.subject_role(&name).unwrap_or_default(),
                            buffered: m.buffered(&name),
                            values: m
                                .latest_frame(&name)
                                .map(|f| f.property_values)
                                .unwrap_or_default(),
                            name,
                        }
                    })
                    .collect(),
            }));
            ProviderView { descriptor, link }
        })
        .collect()
}

fn print_views(views: &[ProviderView], args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    match args.format {
        OutputFormat::Pretty => print_pretty(views, args),
        OutputFormat::Json => print_json(views),
    }
}

fn print_pretty(views: &[ProviderView], args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("{}", "=== livelink Providers ===".bold());
    println!();

    println!(
        "{} {} provider(s) discovered",
        "Providers:".cyan().bold(),
        views.len()
    );
    println!();

    for (i, view) in views.iter().enumerate() {
        let d = &view.descriptor;
        if args.quiet {
            println!(
                "  [{}] {} @ {} ({})",
                i + 1,
                d.display_name,
                d.machine_name,
                d.address
            );
            continue;
        }

        println!(
            "  {} {}",
            format!("[{}]", i + 1).yellow(),
            d.display_name.green()
        );
        println!("      Machine: {}", d.machine_name.white());
        println!("      Address: {}", d.address);
        println!("      Offset:  {:+.3}s", d.machine_time_offset);

        if let Some(link) = &view.link {
            println!(
                "      Link:    {} ({} msgs, clock {:+.3}s)",
                link.status.white(),
                link.messages,
                link.clock_offset
            );
            for subject in &link.subjects {
                println!(
                    "        {} {} (role: {}, buffered: {}) {}",
                    "S".blue(),
                    subject.name.cyan(),
                    subject.role.dimmed(),
                    subject.buffered,
                    format_values(&subject.values).dimmed()
                );
            }
        }
        println!();
    }

    let subjects: usize = views
        .iter()
        .filter_map(|v| v.link.as_ref())
        .map(|l| l.subjects.len())
        .sum();
    println!("{}", "--- Summary ---".dimmed());
    println!(
        "  Providers: {}  Subjects: {}",
        views.len().to_string().white(),
        subjects.to_string().blue()
    );
    println!();

    Ok(())
}

fn print_json(views: &[ProviderView]) -> Result<(), Box<dyn std::error::Error>> {
    let providers: Vec<serde_json::Value> = views
        .iter()
        .map(|view| {
            let d = &view.descriptor;
            let mut entry = serde_json::json!({
                "name": d.display_name,
                "machine": d.machine_name,
                "address": d.address.to_string(),
                "machine_time_offset": d.machine_time_offset,
            });
            if let Some(link) = &view.link {
                entry["link"] = serde_json::json!({
                    "status": link.status,
                    "messages": link.messages,
                    "clock_offset": link.clock_offset,
                    "subjects": link.subjects.iter().map(|s| serde_json::json!({
                        "name": s.name,
                        "role": s.role,
                        "buffered": s.buffered,
                        "values": s.values,
                    })).collect::<Vec<_>>(),
                });
            }
            entry
        })
        .collect();

    println!(
        "{}",
        serde_json::to_string(&serde_json::json!({ "providers": providers }))?
    );
    Ok(())
}

fn format_values(values: &[f32]) -> String {
    if values.is_empty() {
        return String::new();
    }
    let shown: Vec<String> = values.iter().take(6).map(|v| format!("{:.3}", v)).collect();
    if values.len() > 6 {
        format!("[{}, ...]", shown.join(", "))
    } else {
        format!("[{}]", shown.join(", "))
    }
}
