mod services;

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    thread,
};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{Receiver, bounded, select};
use log::LevelFilter;
use relay_engine::{
    MessageBus, RunReport, Runner, RunnerConfig,
    core::logger::{ChannelLogger, LogMessage},
};

use services::{JobHandler, JobProducer, JobTotals};

/// Run a job simulation on the in-process message bus.
#[derive(Debug, Parser)]
#[command(name = "relay", version)]
struct Args {
    /// JSON runner config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run.
    #[arg(long)]
    ticks: Option<u64>,

    /// Milliseconds between ticks.
    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long, default_value_t = 2)]
    producers: usize,

    #[arg(long, default_value_t = 3)]
    handlers: usize,

    #[arg(long, default_value_t = 4)]
    jobs_per_tick: u64,

    /// Make the first producer crash on this tick.
    #[arg(long)]
    crash_at: Option<u64>,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn runner_config(&self) -> Result<RunnerConfig> {
        let mut config = match &self.config {
            Some(path) => RunnerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RunnerConfig::default(),
        };
        if let Some(ticks) = self.ticks {
            config.duration = ticks;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        Ok(config)
    }
}

fn print_logs(records: Receiver<LogMessage>, stop: Receiver<()>) {
    let print = |record: LogMessage| {
        eprintln!(
            "[{:<5} {} {}] {}",
            record.level,
            record.thread.as_deref().unwrap_or("-"),
            record.target,
            record.message
        );
    };
    loop {
        select! {
            recv(records) -> record => match record {
                Ok(record) => print(record),
                Err(_) => return,
            },
            recv(stop) -> _ => {
                records.try_iter().for_each(print);
                return;
            }
        }
    }
}

fn print_report(report: &RunReport, totals: &JobTotals) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "ticks: {}", report.ticks)?;
    writeln!(out, "workers:")?;
    for worker in &report.workers {
        writeln!(
            out,
            "  {:<12} {:>10}  handled {:>5}  {:?}",
            worker.name,
            worker.id.to_string(),
            worker.handled,
            worker.outcome
        )?;
    }

    let stats = &report.stats;
    writeln!(
        out,
        "events: {} sent, {} completed, {} rerouted, {} undeliverable",
        stats.events_sent, stats.events_completed, stats.events_rerouted, stats.events_undeliverable
    )?;
    writeln!(
        out,
        "broadcasts: {} sent, {} deliveries",
        stats.broadcasts_sent, stats.broadcast_deliveries
    )?;

    let (sent, answered, dropped, unanswered) = totals.get();
    writeln!(
        out,
        "jobs: {sent} sent, {answered} answered, {unanswered} unanswered, {dropped} dropped"
    )
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let (logger, records) = ChannelLogger::with_receiver(args.log_level);
    logger.install().context("installing the logger")?;
    let (stop_printer, stop) = bounded::<()>(0);
    let printer = thread::Builder::new()
        .name("log-printer".into())
        .spawn(move || print_logs(records, stop))
        .context("spawning the log printer")?;

    let config = args.runner_config()?;
    let totals = Arc::new(JobTotals::default());
    let mut runner = Runner::new(Arc::new(MessageBus::new()), config);
    for index in 1..=args.producers {
        let crash_at = if index == 1 { args.crash_at } else { None };
        runner.add(
            JobProducer::new(index, args.jobs_per_tick, Arc::clone(&totals)).crash_at(crash_at),
        );
    }
    for index in 1..=args.handlers {
        runner.add(JobHandler::new(index));
    }

    let report = runner.run().context("running the simulation")?;

    drop(stop_printer);
    if printer.join().is_err() {
        eprintln!("log printer panicked");
    }

    if args.json {
        let (sent, answered, dropped, unanswered) = totals.get();
        let json = serde_json::json!({
            "report": report,
            "jobs": {
                "sent": sent,
                "answered": answered,
                "dropped": dropped,
                "unanswered": unanswered,
            },
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print_report(&report, &totals)?;
    }

    Ok(if report.crashed().is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
