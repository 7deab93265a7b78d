//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use queue_lab::{plot::PlotFormat, QueueKind};

#[derive(Parser, Debug)]
#[command(name = "queue-lab")]
#[command(version, about = "Time queues by hand, then measure, model and simulate them")]
pub struct Cli {
    /// Directory holding the lab's data
    #[arg(long, env = "QUEUE_LAB_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, env = "QUEUE_LAB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Keep everything in memory and discard it on exit
    #[arg(long, global = true)]
    pub memory: bool,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage queues
    #[command(subcommand)]
    Queue(QueueCommand),

    /// A client arrives at a queue
    Arrive {
        /// Queue name
        queue: String,
    },

    /// The oldest waiting client leaves a service queue
    Depart {
        /// Queue name
        queue: String,
    },

    /// Reset a queue's chronometer without recording
    Stop {
        /// Queue name
        queue: String,
    },

    /// Show every chronometer
    Status,

    /// Time queues interactively from stdin
    Session {
        /// Queues to time
        #[arg(required = true)]
        queues: Vec<String>,

        /// Print the chronometers every this many seconds
        #[arg(long)]
        tick: Option<u64>,
    },

    /// Browse and delete records
    #[command(subcommand)]
    Records(RecordsCommand),

    /// Write records as CSV
    Export {
        /// Only these queues (repeatable)
        #[arg(long = "queue")]
        queues: Vec<String>,

        /// Output file, stdout if not given
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Append records from CSV files
    Import {
        /// CSV files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Estimate the metrics of a recorded system
    Analyze {
        /// Queue giving the arrivals
        #[arg(long)]
        arrival: String,

        /// Queue giving the services
        #[arg(long)]
        service: String,

        /// Number of servers
        #[arg(long)]
        servers: Option<u32>,

        /// Number of P(n) states
        #[arg(long)]
        max_n: Option<usize>,

        /// Service name
        #[arg(long)]
        name: Option<String>,

        /// Save the result as a service
        #[arg(long)]
        save: bool,
    },

    /// Solve an M/M/c system from its rates
    Model {
        /// Arrival rate
        #[arg(long)]
        lambda: f64,

        /// Service rate per server
        #[arg(long)]
        mu: f64,

        /// Number of servers
        #[arg(long)]
        servers: Option<u32>,

        /// Number of P(n) states
        #[arg(long)]
        max_n: Option<usize>,

        /// Service name
        #[arg(long)]
        name: Option<String>,

        /// Save the result as a service
        #[arg(long)]
        save: bool,
    },

    /// Run a discrete-event simulation
    Simulate(SimulateArgs),

    /// Canned examples
    #[command(subcommand)]
    Cases(CasesCommand),

    /// Saved services
    #[command(subcommand)]
    Services(ServicesCommand),

    /// Summaries of every queue
    Dashboard {
        /// Service time assumed for every client, in seconds
        #[arg(long)]
        assumed_service_time: Option<f64>,
    },

    /// Draw charts with gnuplot
    #[command(subcommand)]
    Plot(PlotCommand),
}

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Define a queue
    Add {
        /// Queue name
        name: String,

        /// arrival (chegada) or service (atendimento)
        #[arg(long, default_value = "service")]
        kind: QueueKind,
    },

    /// Forget a queue, keeping its records
    Remove {
        /// Queue name
        name: String,
    },

    /// List queues with their record counts
    List,
}

#[derive(Subcommand, Debug)]
pub enum RecordsCommand {
    /// Show records
    List {
        /// Only these queues (repeatable)
        #[arg(long = "queue")]
        queues: Vec<String>,
    },

    /// Delete one record
    Delete {
        /// Record id
        id: String,
    },

    /// Delete every record of a queue
    DeleteQueue {
        /// Queue name
        name: String,
    },

    /// Delete all records, element counters and pending clients
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum CasesCommand {
    /// Show the case studies
    List,

    /// Solve a case study and save it as a service
    Load {
        /// Index shown by `cases list`
        index: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServicesCommand {
    /// List saved services
    List,

    /// Show one service in full
    Show {
        /// Service id
        id: String,
    },

    /// Delete a saved service
    Delete {
        /// Service id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PlotCommand {
    /// P(n) and cumulative charts of a saved service
    Service {
        /// Service id
        id: String,

        #[command(flatten)]
        output: PlotOutput,
    },

    /// Queue length and utilisation of a simulation run
    Simulate {
        #[command(flatten)]
        simulation: SimulateArgs,

        #[command(flatten)]
        output: PlotOutput,
    },

    /// Wait histogram of the queue with the longest waits
    Dashboard {
        /// Service time assumed for every client, in seconds
        #[arg(long)]
        assumed_service_time: Option<f64>,

        #[command(flatten)]
        output: PlotOutput,
    },
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Arrival rate
    #[arg(long, default_value_t = 0.5)]
    pub lambda: f64,

    /// Service rate per server
    #[arg(long, default_value_t = 1.0)]
    pub mu: f64,

    /// Number of servers
    #[arg(long, default_value_t = 1)]
    pub servers: u32,

    /// Simulated time
    #[arg(long, default_value_t = 100.0)]
    pub time: f64,

    /// Seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,

    /// Erlang phases per service, 1 for exponential
    #[arg(long, default_value_t = 1)]
    pub phases: u32,

    /// Save the result as a service
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Debug)]
pub struct PlotOutput {
    /// png or pdf
    #[arg(long)]
    pub format: Option<PlotFormat>,

    /// Where charts are written
    #[arg(long, default_value = "charts")]
    pub out_dir: PathBuf,
}
