use std::time::{Duration, Instant};

use bus_tracker_data_management::DataManager;
use bus_tracker_lib::{
    motion::{MotionConfig, MotionModel},
    position::{EndPolicy, Path},
    telemetry::TelemetryMode,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "BusCLI")]
#[command(about = "A CLI to inspect fleet data and dry-run the bus simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Collection {
    Drivers,
    Parents,
    Buses,
    Students,
    Routes,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a collection as JSON
    List { collection: Collection },
    /// Print the timeline of a route
    Stops { route_id: String },
    /// Print the route and roster a bus would start a trip with
    Plan { bus_id: String },
    /// Run the marker along the demo map path and print every update
    Simulate {
        #[arg(long, default_value_t = 20)]
        ticks: u32,
        #[arg(long, default_value = "stop_at_end")]
        policy: EndPolicy,
        #[arg(long, default_value = "synthetic")]
        mode: TelemetryMode,
        #[arg(long, default_value_t = 5.0)]
        step: f64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let data = DataManager::start().await?;

    match cli.command {
        Commands::List { collection } => {
            let json = match collection {
                Collection::Drivers => serde_json::to_string_pretty(&data.drivers().list().await)?,
                Collection::Parents => serde_json::to_string_pretty(&data.parents().list().await)?,
                Collection::Buses => serde_json::to_string_pretty(&data.buses().list().await)?,
                Collection::Students => serde_json::to_string_pretty(&data.students().list().await)?,
                Collection::Routes => {
                    let routes: Vec<_> = data.routes().iter().map(|route| route.as_ref().clone()).collect();
                    serde_json::to_string_pretty(&routes)?
                }
            };
            println!("{json}");
        }
        Commands::Stops { route_id } => {
            let route = data.route(&route_id)?;
            println!("{} ({})", route.name(), route.route_id());
            for (index, stop) in route.stops().iter().enumerate() {
                let students = stop.students_count.map(|n| format!("{n} students")).unwrap_or_default();
                println!("{:>2}. {}  {:<24} {}", index + 1, stop.time_label(), stop.name, students);
            }
        }
        Commands::Plan { bus_id } => {
            let (route, roster) = data.trip_plan(&bus_id).await?;
            println!("Bus {bus_id} runs {} with {} students", route.route_id(), roster.len());
            for student in roster {
                println!("  {} {} ({}) at {}", student.student_id, student.name, student.grade, student.stop_id);
            }
        }
        Commands::Simulate { ticks, policy, mode, step } => {
            let config = MotionConfig {
                step,
                end_policy: policy,
                telemetry_mode: mode,
                ..MotionConfig::default()
            };
            // The demo path is in screen units, call it 10 metres each.
            let mut model = MotionModel::new(Path::demo(), 0.01, config);

            let mut now = Instant::now();
            for tick in 1..=ticks {
                now += Duration::from_millis(50);
                let update = model.tick(now);
                println!(
                    "{tick:>4} {:>6.1}% ({:>6.1}, {:>6.1}) {} km/h {} {}",
                    update.position.progress,
                    update.position.point.x,
                    update.position.point.y,
                    update.telemetry.speed_kmh,
                    update.telemetry.distance,
                    update.telemetry.eta,
                );
                if model.is_finished() {
                    tracing::info!("Reached the end of the path after {tick} ticks");
                    break;
                }
            }
        }
    }

    Ok(())
}
