//! crest-ctl: command-line interface for the Crest daemon's admin API.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_PORT: u16 = 27876;

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ProxyStatusResponse {
    available: bool,
    active: bool,
    light_client: bool,
    forced_server_url: Option<String>,
    forced_peer: Option<String>,
    main_peer_announced_address: Option<String>,
    serving_set: Vec<String>,
    blacklist: Vec<BlacklistEntry>,
}

#[derive(Deserialize)]
struct BlacklistEntry {
    host: String,
    expires_in_secs: u64,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    host: String,
    announced_address: String,
    api_port: u16,
    api_ssl_port: u16,
    state: String,
    chain_state: String,
    version: String,
    connectable: bool,
    blacklisted: bool,
}

#[derive(Deserialize)]
struct ForcedPeerResponse {
    host: Option<String>,
}

#[derive(Deserialize)]
struct DownloadingResponse {
    downloading: bool,
    proxy_active: bool,
}

#[derive(Serialize)]
struct ForcedPeerRequest<'a> {
    host: &'a str,
}

#[derive(Serialize)]
struct DownloadingRequest {
    downloading: bool,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/admin", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to crestd at {} — is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

async fn post_json<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to crestd at {} — is it running?", url))?
        .json::<R>()
        .await
        .context("failed to parse response")
}

async fn delete_json<R: for<'de> Deserialize<'de>>(url: &str) -> Result<R> {
    reqwest::Client::new()
        .delete(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to crestd at {} — is it running?", url))?
        .json::<R>()
        .await
        .context("failed to parse response")
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let resp: ProxyStatusResponse = get_json(&format!("{}/proxy", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Crest Proxy Status");
    println!("═══════════════════════════════════════");
    println!("  Light client     : {}", resp.light_client);
    println!("  Proxy available  : {}", resp.available);
    println!("  Proxy active     : {}", resp.active);
    if let Some(url) = &resp.forced_server_url {
        println!("  Forced server    : {}", url);
    }
    if let Some(host) = &resp.forced_peer {
        println!("  Forced peer      : {}", host);
    }
    if let Some(addr) = &resp.main_peer_announced_address {
        println!("  Main peer        : {}", addr);
    }

    if resp.serving_set.is_empty() {
        println!("\n  No serving set published.");
    } else {
        println!("\n  Serving set:");
        for host in &resp.serving_set {
            println!("    {}", host);
        }
    }

    if !resp.blacklist.is_empty() {
        println!("\n  Blacklisted:");
        for entry in &resp.blacklist {
            println!("    {} ({}s left)", entry.host, entry.expires_in_secs);
        }
    }

    Ok(())
}

async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers known.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Known Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        let port_note = if p.api_ssl_port != 0 {
            format!("{} (TLS {})", p.api_port, p.api_ssl_port)
        } else {
            p.api_port.to_string()
        };
        println!("  ┌─ {}", p.host);
        println!("  │  announced   : {}", p.announced_address);
        println!("  │  api port    : {}", port_note);
        println!("  │  state       : {} / {}", p.state, p.chain_state);
        println!("  │  version     : {}", p.version);
        println!("  │  connectable : {}", p.connectable);
        println!("  └─ blacklisted : {}", p.blacklisted);
    }

    Ok(())
}

async fn cmd_forced_peer_set(port: u16, host: &str) -> Result<()> {
    let resp: ForcedPeerResponse = post_json(
        &format!("{}/proxy/forced-peer", base_url(port)),
        &ForcedPeerRequest { host },
    )
    .await?;
    match resp.host {
        Some(host) => println!("Forced peer set to {}.", host),
        None => println!("Forced peer not set."),
    }
    Ok(())
}

async fn cmd_forced_peer_clear(port: u16) -> Result<()> {
    let _: ForcedPeerResponse =
        delete_json(&format!("{}/proxy/forced-peer", base_url(port))).await?;
    println!("Forced peer cleared.");
    Ok(())
}

async fn cmd_downloading(port: u16, on: bool) -> Result<()> {
    let resp: DownloadingResponse = post_json(
        &format!("{}/node/downloading", base_url(port)),
        &DownloadingRequest { downloading: on },
    )
    .await?;
    println!(
        "Downloading: {}. Proxy active: {}.",
        resp.downloading, resp.proxy_active
    );
    Ok(())
}

fn print_usage() {
    println!("Usage: crest-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status               Show proxy mode, serving set, and blacklist");
    println!("  peers                List known peers");
    println!("  forced-peer <host>   Route all forwarded requests through one peer");
    println!("  forced-peer clear    Return to normal peer selection");
    println!("  downloading on|off   Flip the chain-downloading flag");
    println!();
    println!("Options:");
    println!("  --port <port>   Admin API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd_status(port).await,
        ["peers"]                      => cmd_peers(port).await,
        ["forced-peer", "clear"]       => cmd_forced_peer_clear(port).await,
        ["forced-peer", host]          => cmd_forced_peer_set(port, host).await,
        ["downloading", "on"]          => cmd_downloading(port, true).await,
        ["downloading", "off"]         => cmd_downloading(port, false).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
