use std::path::Path;

use crate::{
    algo::{Agent, Training},
    env::{Environment, GridWorld, Pos},
    error::ConfigError,
    table::PolicyTable,
};

/// Record of one greedy rollout
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeReport {
    /// Every position reached after the start, in order
    pub positions: Vec<Pos>,
    pub total_reward: f64,
    pub steps: u32,
    pub reached_goal: bool,
}

/// Train `agent` in `env` and log a summary of the run
pub fn run_training(
    env: &mut GridWorld,
    agent: &mut dyn Agent,
    episodes: u32,
) -> Result<Training, ConfigError> {
    log::info!("Training {} for {episodes} episodes", agent.name());
    let training = agent.train(env, episodes)?;

    match training.errors.last() {
        Some(last) => log::info!(
            "{} finished after {} iterations, final error {last:.6}",
            agent.name(),
            training.errors.len()
        ),
        None => log::info!("{} finished without iterating", agent.name()),
    }

    Ok(training)
}

/// Play one episode with the agent's current behavior until the environment reports it done
///
/// The episode always ends because the environment truncates at its step budget.
pub fn run_episode(env: &mut GridWorld, agent: &mut dyn Agent) -> EpisodeReport {
    let mut state = env.reset();
    let mut report = EpisodeReport {
        positions: Vec::new(),
        total_reward: 0.0,
        steps: 0,
        reached_goal: false,
    };

    loop {
        let action = agent.choose_action(state);
        let outcome = env.step(action);
        log::trace!(
            "{state:?} {action:?} -> {:?} ({})",
            outcome.next_state,
            outcome.reward
        );

        report.positions.push(outcome.next_state);
        report.total_reward += outcome.reward;
        report.steps += 1;
        state = outcome.next_state;

        if outcome.done() {
            report.reached_goal = outcome.terminated;
            break;
        }
    }

    report
}

/// Play `episodes` episodes and collect their total rewards
pub fn run_multiple_episodes(
    env: &mut GridWorld,
    agent: &mut dyn Agent,
    episodes: u32,
) -> Vec<f64> {
    (0..episodes)
        .map(|i| {
            let report = run_episode(env, agent);
            log::info!(
                "Episode {}: total reward = {:.2}, {} steps{}",
                i + 1,
                report.total_reward,
                report.steps,
                if report.reached_goal { ", goal reached" } else { "" }
            );
            report.total_reward
        })
        .collect()
}

/// Write a training error curve as `episode,error` rows
pub fn write_errors_csv(path: impl AsRef<Path>, errors: &[f64]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["episode", "error"])?;

    for (i, error) in errors.iter().enumerate() {
        wtr.write_record(&[i.to_string(), error.to_string()])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Draw a policy as a grid of arrows, top row first
///
/// Obstacles are drawn as `#` and goals as `G`.
pub fn render_policy(env: &GridWorld, policy: &PolicyTable) -> String {
    let size = env.size();
    let mut out = String::with_capacity(size * (2 * size + 1));

    for y in (0..size).rev() {
        let row: Vec<String> = (0..size)
            .map(|x| {
                let pos = (x, y);
                if env.is_obstacle(pos) {
                    '#'
                } else if env.is_goal(pos) {
                    'G'
                } else {
                    policy[pos].arrow()
                }
                .to_string()
            })
            .collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::{
        algo::{RandomAgent, ValueIterationAgent},
        env::{Action, GridConfig},
    };

    use super::*;

    fn corridor() -> GridWorld {
        GridWorld::new(GridConfig {
            size: 3,
            start: (0, 0),
            goals: vec![(2, 0)],
            obstacles: vec![(1, 1)],
            max_steps: 10,
        })
        .unwrap()
    }

    #[test]
    fn trained_planner_reaches_goal() {
        let mut env = corridor();
        let mut agent = ValueIterationAgent::new(&env, Default::default()).unwrap();
        run_training(&mut env, &mut agent, 100).unwrap();

        let report = run_episode(&mut env, &mut agent);
        assert!(report.reached_goal);
        assert_eq!(report.steps, 2);
        assert_eq!(report.positions, vec![(1, 0), (2, 0)]);
        assert!((report.total_reward - 9.9).abs() < 1e-12);
    }

    #[test]
    fn training_on_another_grid_is_rejected() {
        let mut env = corridor();
        let mut agent = ValueIterationAgent::new(&env, Default::default()).unwrap();
        let mut bigger = GridWorld::new(GridConfig::default()).unwrap();

        assert_eq!(
            run_training(&mut bigger, &mut agent, 100),
            Err(ConfigError::GridMismatch {
                expected: 3,
                found: 6
            })
        );
        assert!(run_training(&mut env, &mut agent, 100).is_ok());
    }

    #[test]
    fn episodes_end_at_the_step_budget() {
        let mut env = corridor();
        let mut agent = RandomAgent::new(Some(3));
        let rewards = run_multiple_episodes(&mut env, &mut agent, 20);

        assert_eq!(rewards.len(), 20);
        for _ in 0..20 {
            let report = run_episode(&mut env, &mut agent);
            assert!(report.steps <= 10);
            assert_eq!(report.positions.len(), report.steps as usize);
        }
    }

    #[test]
    fn errors_csv_has_a_row_per_episode() {
        let dir = std::env::temp_dir()
            .join(format!("gridworld-rl-trainer-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("errors.csv");

        write_errors_csv(&path, &[0.5, 0.25, 0.0]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["episode,error", "0,0.5", "1,0.25", "2,0"]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn policy_rendering() {
        let env = corridor();
        let policy = PolicyTable::filled(3, Action::Right);
        assert_eq!(render_policy(&env, &policy), "→ → →\n→ # →\n→ → G\n");
    }
}
