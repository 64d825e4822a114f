use axum::extract::Extension;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use overlay_ipam::addrs::types::Subnet;
use overlay_ipam::allocator::actor;
use overlay_ipam::allocator::allocator::Allocator;
use overlay_ipam::allocator::handlers::{
    handle_allocate, handle_claim, handle_free, handle_shutdown, handle_status, handle_takeover,
};
use overlay_ipam::allocator::protocol::{
    ENDPOINT_IP, ENDPOINT_IP_ADDR, ENDPOINT_PEER, ENDPOINT_SHUTDOWN, ENDPOINT_STATUS,
};
use overlay_ipam::gossip::service::MeshService;
use overlay_ipam::gossip::types::{Directory, Gossip, PeerName};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --subnet <cidr> --bind <addr:port> [--http <addr:port>] \
             [--seed <addr:port>] [--name <id>] [--nickname <name>] [--quorum <n>]",
            args[0]
        );
        eprintln!(
            "Example: {} --subnet 10.32.0.0/16 --bind 127.0.0.1:6783 --http 127.0.0.1:6784",
            args[0]
        );
        eprintln!(
            "Example: {} --subnet 10.32.0.0/16 --bind 127.0.0.1:6785 --seed 127.0.0.1:6783",
            args[0]
        );
        std::process::exit(1);
    }

    let mut subnet_cidr: Option<String> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut http_addr: Option<SocketAddr> = None;
    let mut seeds: Vec<SocketAddr> = vec![];
    let mut name: Option<String> = None;
    let mut nickname: Option<String> = None;
    let mut quorum: Option<u32> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--subnet" => {
                subnet_cidr = Some(args[i + 1].clone());
                i += 2;
            }
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--http" => {
                http_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--seed" => {
                seeds.push(args[i + 1].parse()?);
                i += 2;
            }
            "--name" => {
                name = Some(args[i + 1].clone());
                i += 2;
            }
            "--nickname" => {
                nickname = Some(args[i + 1].clone());
                i += 2;
            }
            "--quorum" => {
                quorum = Some(args[i + 1].parse()?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let subnet_cidr = subnet_cidr.expect("--subnet is required");
    let bind_addr = bind_addr.expect("--bind is required");

    // Invalid or unsupported subnets are fatal at startup
    let subnet = match Subnet::parse(&subnet_cidr) {
        Ok(subnet) => subnet,
        Err(e) => {
            eprintln!("Bad --subnet {}: {}", subnet_cidr, e);
            std::process::exit(1);
        }
    };

    let our_name = name.map(PeerName).unwrap_or_else(PeerName::random);
    let quorum = quorum
        .or_else(|| {
            std::env::var("QUORUM")
                .ok()
                .and_then(|value| value.parse().ok())
        })
        .unwrap_or(1);

    tracing::info!("Managing subnet {} as {:?}", subnet, our_name);
    if !seeds.is_empty() {
        tracing::info!("Seeds: {:?}", seeds);
    }

    // 1. Overlay fabric (UDP gossip):
    let mesh = MeshService::new(bind_addr, our_name.clone(), nickname, seeds).await?;

    // 2. The allocator actor:
    let alloc = Allocator::new(
        our_name,
        subnet,
        quorum,
        mesh.clone() as Arc<dyn Gossip>,
        mesh.clone() as Arc<dyn Directory>,
    );
    let handle = actor::start(alloc);
    mesh.start(handle.clone());

    // 3. HTTP command surface:
    let app = Router::new()
        .route(ENDPOINT_IP, post(handle_allocate).delete(handle_free))
        .route(ENDPOINT_IP_ADDR, put(handle_claim))
        .route(ENDPOINT_PEER, delete(handle_takeover))
        .route(ENDPOINT_STATUS, get(handle_status))
        .route(ENDPOINT_SHUTDOWN, post(handle_shutdown))
        .layer(Extension(handle));

    let http_addr = http_addr.unwrap_or_else(|| {
        let mut addr = bind_addr;
        addr.set_port(bind_addr.port() + 1);
        addr
    });
    tracing::info!("HTTP API on {}", http_addr);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
