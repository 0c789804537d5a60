use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use gridworld_rl::{
    algo::{AgentKind, Hyperparameters},
    env::{parse_position, parse_positions, GridConfig, GridWorld, Pos},
    error::ConfigError,
    trainer::{render_policy, run_multiple_episodes, run_training, write_errors_csv},
};
use serde::Deserialize;
use strum::IntoEnumIterator;
use tracing_subscriber::filter::LevelFilter;

/// Train and evaluate tabular agents on a grid world
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Agent to run: `all`, `random`, `monte-carlo`, `q-learning`,
    /// `policy-iteration` or `value-iteration`
    #[arg(short, long, default_value = "all")]
    agent: String,

    /// Training episodes (iteration ceiling for the planners)
    #[arg(short, long, default_value_t = 1000)]
    episodes: u32,

    /// Side length of the grid
    #[arg(long)]
    size: Option<usize>,

    /// Goal cells, as `x-y,x-y`
    #[arg(long, value_parser = parse_position_list)]
    goals: Option<Positions>,

    /// Obstacle cells, as `x-y,x-y`
    #[arg(long, value_parser = parse_position_list)]
    obstacles: Option<Positions>,

    /// Start cell, as `x-y`
    #[arg(long, value_parser = parse_position)]
    start: Option<Pos>,

    /// Step budget of an episode
    #[arg(long)]
    max_steps: Option<u32>,

    #[arg(long)]
    gamma: Option<f64>,

    #[arg(long)]
    alpha: Option<f64>,

    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long)]
    theta: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// JSON file with `grid` and `params` sections; flags override its values
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Directory for saved tables and error curves
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,

    /// Evaluation episodes after training
    #[arg(long, default_value_t = 5)]
    eval_episodes: u32,

    /// Log more (`-v` debug, `-vv` trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone)]
struct Positions(Vec<Pos>);

fn parse_position_list(s: &str) -> Result<Positions, ConfigError> {
    parse_positions(s).map(Positions)
}

/// Contents of a `--config` file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RunConfig {
    grid: GridConfig,
    params: Hyperparameters,
}

impl RunConfig {
    fn load(args: &Args) -> Result<Self> {
        let mut config: RunConfig = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => RunConfig::default(),
        };

        let grid = &mut config.grid;
        if let Some(size) = args.size {
            grid.size = size;
        }
        if let Some(Positions(goals)) = &args.goals {
            grid.goals = goals.clone();
        }
        if let Some(Positions(obstacles)) = &args.obstacles {
            grid.obstacles = obstacles.clone();
        }
        if let Some(start) = args.start {
            grid.start = start;
        }
        if let Some(max_steps) = args.max_steps {
            grid.max_steps = max_steps;
        }

        let params = &mut config.params;
        params.gamma = args.gamma.unwrap_or(params.gamma);
        params.alpha = args.alpha.unwrap_or(params.alpha);
        params.epsilon = args.epsilon.unwrap_or(params.epsilon);
        params.theta = args.theta.unwrap_or(params.theta);
        params.seed = args.seed.or(params.seed);

        Ok(config)
    }
}

fn agent_kinds(name: &str) -> Result<Vec<AgentKind>, ConfigError> {
    if name.eq_ignore_ascii_case("all") {
        return Ok(AgentKind::iter().collect());
    }
    name.parse()
        .map(|kind| vec![kind])
        .map_err(|_| ConfigError::UnknownAgent(name.to_string()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let kinds = agent_kinds(&args.agent)?;
    let RunConfig { grid, params } = RunConfig::load(&args)?;
    let mut env = GridWorld::new(grid).context("invalid grid")?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    for kind in kinds {
        let mut agent = kind
            .build(&env, &params)
            .with_context(|| format!("building {kind} agent"))?;
        let name = agent.name();
        log::info!("=== Running {name} ===");

        let training = run_training(&mut env, agent.as_mut(), args.episodes)
            .with_context(|| format!("training {name}"))?;
        if let Some(policy) = &training.policy {
            log::info!("Policy learned for {name}:\n{}", render_policy(&env, policy));
        }

        agent
            .save_tables(&args.out_dir)
            .with_context(|| format!("saving {name} tables"))?;
        let csv_path = args.out_dir.join(format!("errors_{kind}.csv"));
        write_errors_csv(&csv_path, &training.errors)
            .with_context(|| format!("writing {}", csv_path.display()))?;

        let rewards = run_multiple_episodes(&mut env, agent.as_mut(), args.eval_episodes);
        let average = rewards.iter().sum::<f64>() / rewards.len().max(1) as f64;
        println!(
            "{name}: average reward over {} episodes: {average:.2}",
            args.eval_episodes
        );
    }

    Ok(())
}
