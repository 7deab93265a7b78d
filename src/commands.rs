//! What each subcommand does.

use std::{
    fs::File,
    io::{BufWriter, Write},
    time::Duration,
};

use anyhow::{Context, Result};
use queue_lab::{
    lab::Arrival,
    plot::Plotter,
    report,
    simulation::{self, SimulationConfig, SimulationResult},
    LabConfig, LabError, MmcModel, Recorder, RecordStore, Service,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    time::MissedTickBehavior,
};
use tracing::{info, warn};

use crate::cli::{
    CasesCommand, Command, PlotCommand, PlotOutput, QueueCommand, RecordsCommand,
    ServicesCommand, SimulateArgs,
};

type Lab = queue_lab::Lab<Box<dyn RecordStore>>;

pub async fn run(command: Command, mut lab: Lab, config: &LabConfig) -> Result<()> {
    match command {
        Command::Queue(QueueCommand::Add { name, kind }) => {
            let queue = lab.add_queue(&name, kind).await?;
            println!("Added {} queue '{}'", queue.kind, queue.name);
        }
        Command::Queue(QueueCommand::Remove { name }) => {
            lab.remove_queue(&name).await?;
            println!("Removed queue '{name}', its records are kept");
        }
        Command::Queue(QueueCommand::List) => print!("{}", report::overview(&lab.queue_overview())),

        Command::Arrive { queue } => {
            let arrival = lab.arrive(&queue).await?;
            print_arrival(&queue, &arrival);
        }
        Command::Depart { queue } => {
            let record = lab.depart(&queue).await?;
            print_departure(&record);
        }
        Command::Stop { queue } => {
            let dropped = lab.stop(&queue).await?;
            println!("Stopped '{queue}', {dropped} pending client(s) dropped");
        }
        Command::Status => print!("{}", report::status(&lab.status())),
        Command::Session { queues, tick } => session(lab, queues, tick).await?,

        Command::Records(RecordsCommand::List { queues }) => {
            print!("{}", report::records(lab.records_for(&queues)));
        }
        Command::Records(RecordsCommand::Delete { id }) => {
            let record = lab.delete_record(&id).await?;
            println!("Deleted record {} of '{}'", record.id, record.queue);
        }
        Command::Records(RecordsCommand::DeleteQueue { name }) => {
            let deleted = lab.delete_queue_records(&name).await?;
            println!("Deleted {deleted} record(s) of '{name}'");
        }
        Command::Records(RecordsCommand::Clear) => {
            let deleted = lab.clear_all().await?;
            println!("Deleted {deleted} record(s), counters and pending clients reset");
        }

        Command::Export { queues, output } => match output {
            Some(path) => {
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let mut writer = BufWriter::new(file);
                let written = lab.export_csv(&queues, &mut writer)?;
                writer.flush()?;
                println!("Exported {written} record(s) to {}", path.display());
            }
            None => {
                lab.export_csv(&queues, std::io::stdout().lock())?;
            }
        },
        Command::Import { files } => {
            let readers = files
                .iter()
                .map(|path| {
                    File::open(path).with_context(|| format!("Failed to open {}", path.display()))
                })
                .collect::<Result<Vec<_>>>()?;
            let imported = lab.import_csv(readers).await?;
            println!("Imported {imported} record(s) from {} file(s)", files.len());
        }

        Command::Analyze {
            arrival,
            service,
            servers,
            max_n,
            name,
            save,
        } => {
            let analysed = lab.analyze(
                &arrival,
                &service,
                servers.unwrap_or(config.default_servers),
                max_n.unwrap_or(config.default_max_n),
                name,
            )?;
            print!("{}", report::service(&analysed));
            if save {
                let saved = lab.save_service(analysed).await?;
                println!("\nSaved as service {}", saved.id);
            }
        }
        Command::Model {
            lambda,
            mu,
            servers,
            max_n,
            name,
            save,
        } => {
            let metrics = MmcModel::builder()
                .lambda(lambda)
                .mu(mu)
                .servers(servers.unwrap_or(config.default_servers))
                .build()?
                .solve(max_n.unwrap_or(config.default_max_n))?;
            print!("{}\n{}", report::metrics(&metrics), report::probabilities(&metrics));
            if save {
                let now = lab.now();
                let saved = lab.save_service(Service::from_model(name, metrics, now)).await?;
                println!("\nSaved as service {}", saved.id);
            }
        }
        Command::Simulate(args) => {
            let result = simulate(&args)?;
            print!("{}", report::simulation(&result));
            if args.save {
                save_simulation(&mut lab, &result).await?;
            }
        }

        Command::Cases(CasesCommand::List) => print!("{}", report::case_studies()),
        Command::Cases(CasesCommand::Load { index }) => {
            let service = lab.load_case_study(index).await?;
            print!("{}", report::service(service));
        }

        Command::Services(ServicesCommand::List) => print!("{}", report::services(lab.services())),
        Command::Services(ServicesCommand::Show { id }) => {
            print!("{}", report::service(lab.service(&id)?));
        }
        Command::Services(ServicesCommand::Delete { id }) => {
            let service = lab.delete_service(&id).await?;
            println!("Deleted service '{}'", service.name);
        }

        Command::Dashboard {
            assumed_service_time,
        } => {
            let assumed = assumed_service_time.unwrap_or(config.assumed_service_time_secs);
            print!("{}", report::dashboard(&lab.dashboard(assumed)));
        }

        Command::Plot(command) => plot(command, &mut lab, config).await?,
    }

    Ok(())
}

fn simulate(args: &SimulateArgs) -> Result<SimulationResult> {
    let config = SimulationConfig::builder()
        .lambda(args.lambda)
        .mu(args.mu)
        .servers(args.servers)
        .horizon(args.time)
        .phases(args.phases)
        .maybe_seed(args.seed)
        .build()?;
    if config.utilisation() >= 1.0 {
        warn!(rho = config.utilisation(), "simulating an unstable system, the queue will grow");
    }
    Ok(simulation::run(&config)?)
}

async fn save_simulation(lab: &mut Lab, result: &SimulationResult) -> Result<()> {
    let now = lab.now();
    let saved = lab.save_service(Service::from_simulation(result, now)).await?;
    println!("\nSaved as service {}", saved.id);
    Ok(())
}

async fn plot(command: PlotCommand, lab: &mut Lab, config: &LabConfig) -> Result<()> {
    let charts = match command {
        PlotCommand::Service { id, output } => plotter(&output, config).service(lab.service(&id)?)?,
        PlotCommand::Simulate { simulation, output } => {
            let result = simulate(&simulation)?;
            let chart = plotter(&output, config).simulation(&result)?;
            if simulation.save {
                save_simulation(lab, &result).await?;
            }
            vec![chart]
        }
        PlotCommand::Dashboard {
            assumed_service_time,
            output,
        } => {
            let assumed = assumed_service_time.unwrap_or(config.assumed_service_time_secs);
            let dashboard = lab.dashboard(assumed);
            let worst = dashboard
                .worst_queue
                .as_deref()
                .context("No records to plot yet")?;
            vec![plotter(&output, config).wait_histogram(worst, &dashboard.histogram)?]
        }
    };

    println!("\n=== Charts ===");
    for chart in charts {
        println!("{}", chart.display());
    }
    Ok(())
}

fn plotter(output: &PlotOutput, config: &LabConfig) -> Plotter {
    Plotter::new(&output.out_dir, output.format.unwrap_or(config.plot_format))
}

fn print_arrival(queue: &str, arrival: &Arrival) {
    match arrival {
        Arrival::Recorded(record) => println!(
            "#{} arrived at '{queue}' ({:.2}s since the previous arrival)",
            record.element,
            record.total_time_secs()
        ),
        Arrival::Pending { element, waiting } => {
            println!("#{element} arrived at '{queue}', {waiting} waiting")
        }
    }
}

fn print_departure(record: &queue_lab::QueueRecord) {
    println!(
        "#{} left '{}' after {:.2}s",
        record.element,
        record.queue,
        record.total_time_secs()
    );
}

#[derive(Debug, PartialEq, Eq)]
enum SessionCommand {
    Arrive(String),
    Depart(String),
    Stop(String),
    Status,
    Help,
    Quit,
}

const SESSION_HELP: &str = "\
Commands:
  a [queue]   a client arrives
  d [queue]   the oldest waiting client leaves
  s [queue]   reset the chronometer
  t           show the chronometers
  h           this help
  q           quit
A queue is given by name or by its number in the session. It can be left out when the session
times a single queue.";

fn parse_session_command(line: &str, queues: &[String]) -> Result<SessionCommand, String> {
    let line = line.trim();
    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

    let queue = || -> Result<String, String> {
        let rest = rest.trim();
        if rest.is_empty() {
            return match queues {
                [only] => Ok(only.clone()),
                _ => Err("Which queue? Give its name or number".to_string()),
            };
        }
        if let Some(queue) = queues.iter().find(|q| q.as_str() == rest) {
            return Ok(queue.clone());
        }
        rest.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| queues.get(i))
            .cloned()
            .ok_or_else(|| format!("'{rest}' is not one of this session's queues"))
    };

    match verb.to_ascii_lowercase().as_str() {
        "a" | "arrive" => queue().map(SessionCommand::Arrive),
        "d" | "depart" => queue().map(SessionCommand::Depart),
        "s" | "stop" => queue().map(SessionCommand::Stop),
        "t" | "status" => Ok(SessionCommand::Status),
        "h" | "help" | "?" => Ok(SessionCommand::Help),
        "q" | "quit" | "exit" => Ok(SessionCommand::Quit),
        "" => Ok(SessionCommand::Help),
        other => Err(format!("Unknown command '{other}', type h for help")),
    }
}

async fn apply(recorder: &Recorder, command: SessionCommand) -> Result<(), LabError> {
    match command {
        SessionCommand::Arrive(queue) => {
            let arrival = recorder.arrive(queue.as_str()).await?;
            print_arrival(&queue, &arrival);
        }
        SessionCommand::Depart(queue) => print_departure(&recorder.depart(queue).await?),
        SessionCommand::Stop(queue) => {
            let dropped = recorder.stop(queue.as_str()).await?;
            println!("Stopped '{queue}', {dropped} pending client(s) dropped");
        }
        SessionCommand::Status => print!("{}", report::status(&recorder.status().await?)),
        SessionCommand::Help => println!("{SESSION_HELP}"),
        SessionCommand::Quit => {}
    }
    Ok(())
}

async fn session(lab: Lab, queues: Vec<String>, tick: Option<u64>) -> Result<()> {
    for queue in &queues {
        lab.queue(queue)?;
    }

    let recorder = Recorder::spawn(lab);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut ticker = tokio::time::interval(Duration::from_secs(tick.unwrap_or(1).max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(queues = ?queues, "session started");
    for (i, queue) in queues.iter().enumerate() {
        println!("[{}] {queue}", i + 1);
    }
    println!("{SESSION_HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_session_command(&line, &queues) {
                    Ok(SessionCommand::Quit) => break,
                    Ok(command) => match apply(&recorder, command).await {
                        Ok(()) => {}
                        Err(e) if e.is_recoverable() => eprintln!("{e}"),
                        Err(e) => return Err(e.into()),
                    },
                    Err(message) => eprintln!("{message}"),
                }
            }

            _ = ticker.tick(), if tick.is_some() => {
                print!("{}", report::status(&recorder.status().await?));
            }

            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    let worker = recorder.worker_handle();
    worker.shut_down().await;
    worker.wait_for_shutdown().await;
    info!("session ended");
    Ok(())
}
