use clap::Parser;
use log::{error, info};
use server::engine::Engine;
use server::entity::{Circle, Entity, Rectangle, Robot, Shape};
use server::gate::Gate;
use server::network::Server;
use server::simulation::{Simulation, SimulationError};
use shared::{Point, DEFAULT_SIMULATION_DELAY_MS, DEFAULT_SIMULATION_STEP};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Khepera robot simulation server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "6020")]
    port: u16,
    /// Simulated seconds per step
    #[clap(long, default_value_t = DEFAULT_SIMULATION_STEP)]
    step: f64,
    /// Wall-clock milliseconds between steps
    #[clap(long, default_value_t = DEFAULT_SIMULATION_DELAY_MS)]
    period_ms: u64,
    /// World snapshot file to load instead of the built-in world
    #[clap(short, long)]
    world: Option<PathBuf>,
    /// Treat the world file as whitespace-delimited text, not binary
    #[clap(long)]
    text_world: bool,
}

/// A small built-in world: one robot, one wall, one pushable ball.
fn default_world() -> Result<Simulation, SimulationError> {
    let mut sim = Simulation::new(800, 600);
    sim.add_entity(Entity::new(
        1,
        10,
        true,
        Shape::Robot(Robot::new(Point::new(400.0, 300.0), 26.0, 0.0)),
    ))?;
    sim.add_entity(Entity::new(
        2,
        1000,
        false,
        Shape::Rectangle(Rectangle::new(Point::new(150.0, 150.0), 200.0, 40.0, 0.0)),
    ))?;
    sim.add_entity(Entity::new(
        3,
        5,
        true,
        Shape::Circle(Circle::new(Point::new(550.0, 400.0), 30.0)),
    ))?;
    Ok(sim)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let simulation = match &args.world {
        Some(path) => Simulation::load(path, !args.text_world)?,
        None => default_world()?,
    };
    info!(
        "World {}x{} with {} entities",
        simulation.world_width(),
        simulation.world_height(),
        simulation.entity_count()
    );

    let gate = Arc::new(Gate::new(simulation));
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();

    let mut engine = Engine::new(
        Arc::clone(&gate),
        args.step,
        Duration::from_millis(args.period_ms),
    );
    engine.start(updates_tx)?;

    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, Arc::clone(&gate), updates_rx).await?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server loop failed: {}", e);
        }
    });

    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    engine.stop().await?;
    Ok(())
}
