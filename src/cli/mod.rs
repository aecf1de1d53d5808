pub mod report;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    analytics::time::{TimeAggregator, TimePeriod, DEFAULT_TOP_PROJECTS},
    pulse::{
        csv::pulses_to_csv,
        entities::PulseSubmission,
        ingestion::IngestionPipeline,
        normalizer::{HostEnvironment, PulseNormalizer},
    },
    storage::{entities::PageOptions, pulse_store::PulseStoreImpl, PulseRepository},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX},
        time::days_range,
    },
};

use report::{OverviewReport, Report};

#[derive(Parser, Debug)]
#[command(name = "Pulsemeter", version, long_about = None)]
#[command(about = "Collects activity pulses and shows where the time went", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
    #[arg(long, global = true, help = "Log level, e.g. debug or warn")]
    log_filter: Option<LevelFilter>,
    #[arg(long, global = true, help = "Print results as JSON")]
    json: bool,
}

#[derive(Debug, Clone, Copy, clap::Args)]
struct DayRange {
    #[arg(long, short, help = "First day, YYYY-MM-DD. Defaults to today")]
    start: Option<NaiveDate>,
    #[arg(long, short, help = "Last day, YYYY-MM-DD. Defaults to today")]
    end: Option<NaiveDate>,
}

impl DayRange {
    fn resolve(self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
        let end = self.end.unwrap_or(today);
        let start = self.start.unwrap_or(end);
        if start > end {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Start {start} is after end {end}"),
                )
                .into());
        }
        Ok((start, end))
    }
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Store pulses. Accepts a JSON object or an array of them")]
    Ingest {
        #[arg(long, short, help = "File with pulses. Reads stdin when absent")]
        file: Option<PathBuf>,
    },
    #[command(about = "Minutes per category, top projects and sites")]
    Overview {
        #[command(flatten)]
        range: DayRange,
    },
    #[command(about = "Minutes tracked today")]
    Today {},
    #[command(about = "Today, yesterday and the previous seven days")]
    Week {
        #[arg(long, short, help = "Day to anchor the week at. Defaults to today")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Deep work periods. Defaults to the last seven days")]
    DeepWork {
        #[command(flatten)]
        range: DayRange,
    },
    #[command(about = "Clients pulses were sent from")]
    Sources {
        #[command(flatten)]
        range: DayRange,
        #[arg(long, help = "List every known source instead of minutes in the range")]
        all: bool,
    },
    #[command(about = "Minutes per project")]
    Projects {
        #[command(flatten)]
        range: DayRange,
        #[arg(long, short, help = "Only projects of this category, paginated")]
        category: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        take: u32,
    },
    #[command(about = "Export every stored pulse as CSV")]
    Export {
        #[arg(long, short, help = "Output file. Prints to stdout when absent")]
        output: Option<PathBuf>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };
    let logging_level = args
        .log_filter
        .or_else(|| args.log.then_some(LevelFilter::TRACE));
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let store = Arc::new(PulseStoreImpl::new(app_dir.join("records"), Local)?);
    let clock = DefaultClock;
    let today = clock.today();
    let report = Report::new(args.json);

    match args.commands {
        Commands::Ingest { file } => {
            let pipeline = IngestionPipeline::new(
                store,
                PulseNormalizer::new(HostEnvironment::detect(), Box::new(clock)),
            );
            let payload = read_payload(file).await?;
            let accepted = match payload {
                Value::Object(_) => {
                    let submission = serde_json::from_value::<PulseSubmission>(payload)?;
                    pipeline.ingest_one(submission).await?
                }
                payload => pipeline.ingest_batch_json(payload).await?,
            };
            info!("Accepted {accepted} pulses");
            report.accepted(accepted)
        }
        Commands::Overview { range } => {
            let (first, last) = range.resolve(today)?;
            overview(&TimeAggregator::new(store, Local), &report, first, last).await
        }
        Commands::Today {} => {
            let aggregator = TimeAggregator::new(store, Local);
            report.day_total(today, aggregator.day_total_minutes(today).await?)
        }
        Commands::Week { date } => {
            let date = date.unwrap_or(today);
            let aggregator = TimeAggregator::new(store, Local);
            report.week(date, &aggregator.week_overview(date).await?)
        }
        Commands::DeepWork { range } => {
            let range = DayRange {
                start: range.start.or_else(|| today.checked_sub_days(Days::new(6))),
                ..range
            };
            let (first, last) = range.resolve(today)?;
            let aggregator = TimeAggregator::new(store, Local);
            report.deep_work(&aggregator.deep_work_between_dates(first, last).await?)
        }
        Commands::Sources { range, all } => {
            let aggregator = TimeAggregator::new(store, Local);
            if all {
                report.sources(&aggregator.list_sources().await?)
            } else {
                let (first, last) = range.resolve(today)?;
                let (start, end) = days_range(first, last, &Local);
                report.sources_minutes(&aggregator.sources_minutes(start, end).await?)
            }
        }
        Commands::Projects {
            range,
            category,
            page,
            take,
        } => {
            let (first, last) = range.resolve(today)?;
            let aggregator = TimeAggregator::new(store, Local);
            match category {
                Some(category) => {
                    let (start, end) = days_range(first, last, &Local);
                    let page = aggregator
                        .per_project_overview_by_category(
                            start,
                            end,
                            &category,
                            PageOptions { page, take },
                        )
                        .await?;
                    report.project_page(&category, &page)
                }
                None => report.projects_by_category(
                    &aggregator
                        .projects_time_by_range_and_category(first, last)
                        .await?,
                    &aggregator.projects_time_by_range(first, last).await?,
                ),
            }
        }
        Commands::Export { output } => {
            let csv = pulses_to_csv(&store.all_pulses().await?);
            match output {
                Some(path) => {
                    tokio::fs::write(&path, csv).await?;
                    info!("Exported pulses into {path:?}");
                    Ok(())
                }
                None => {
                    print!("{csv}");
                    Ok(())
                }
            }
        }
    }
}

async fn read_payload(file: Option<PathBuf>) -> Result<Value> {
    let raw = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Compares the chosen days with the same amount of days right before them.
async fn overview<R: PulseRepository>(
    aggregator: &TimeAggregator<R>,
    report: &Report,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<()> {
    let length = Days::new((last - first).num_days() as u64 + 1);
    let (start, end) = days_range(first, last, &Local);
    let previous = first
        .checked_sub_days(length)
        .zip(first.pred_opt())
        .map(|(previous_first, previous_last)| days_range(previous_first, previous_last, &Local));

    let mut periods = vec![TimePeriod::new(start, end)];
    if let Some((previous_start, previous_end)) = previous {
        periods.push(TimePeriod::new(previous_start, previous_end));
    }
    let mut overviews = aggregator
        .category_overview_for_periods(&periods)
        .await?
        .into_iter();

    let overview = OverviewReport {
        first,
        last,
        total_minutes: aggregator.total_time_by_range(first, last).await?,
        current: overviews.next().unwrap_or_default(),
        previous: overviews.next().unwrap_or_default(),
        projects: aggregator
            .per_project_top_n(start, end, DEFAULT_TOP_PROJECTS)
            .await?,
        sites: aggregator.sites_minutes(start, end).await?,
        social_media: aggregator.social_media_time_by_range(first, last).await?,
        growth: aggregator
            .growth_and_mastery_time_by_range(first, last)
            .await?,
    };
    report.overview(&overview)
}
