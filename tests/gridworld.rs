use std::{fs, path::PathBuf};

use gridworld_rl::{
    algo::{Agent, AgentKind, Hyperparameters, ValueIterationAgent},
    env::{Action, DiscreteStateSpace, Environment, GridConfig, GridWorld, Model},
    error::{ConfigError, TableError},
    table::{QTable, ValueTable},
    trainer::{run_episode, run_training},
};
use strum::IntoEnumIterator;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gridworld-rl-it-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn params() -> Hyperparameters {
    Hyperparameters {
        seed: Some(1234),
        ..Default::default()
    }
}

#[test]
fn live_steps_follow_the_model() {
    let mut env = GridWorld::new(GridConfig::default()).unwrap();
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let mut state = env.reset();
        loop {
            let action = env.random_action(&mut rng);
            let expected = env.simulate_step(state, action);
            let outcome = env.step(action);

            assert_eq!(outcome.next_state, expected.next_state);
            assert_eq!(outcome.reward, expected.reward);
            assert_eq!(outcome.terminated, expected.terminated);
            assert!(!env.is_obstacle(outcome.next_state));

            state = outcome.next_state;
            if outcome.done() {
                break;
            }
        }
    }
}

#[test]
fn three_by_three_value_iteration() {
    let mut env = GridWorld::new(GridConfig {
        size: 3,
        start: (0, 0),
        goals: vec![(2, 2)],
        obstacles: vec![],
        max_steps: 20,
    })
    .unwrap();
    let mut agent = ValueIterationAgent::new(&env, Default::default()).unwrap();
    let training = run_training(&mut env, &mut agent, 100).unwrap();

    let policy = training.policy.unwrap();
    assert!(matches!(policy[(0, 0)], Action::Up | Action::Right));
    assert_eq!(agent.values()[(2, 2)], 0.0);

    let report = run_episode(&mut env, &mut agent);
    assert!(report.reached_goal);
    assert_eq!(report.steps, 4, "Shortest path from the corner");
}

#[test]
fn saved_tables_restore_behavior() {
    let saved = scratch_dir("saved");
    let resaved = scratch_dir("resaved");
    let env = GridWorld::new(GridConfig::default()).unwrap();

    for kind in AgentKind::iter() {
        let mut trained = kind.build(&env, &params()).unwrap();
        trained.train(&mut env.clone(), 300).unwrap();
        trained.save_tables(&saved).unwrap();

        let mut restored = kind.build(&env, &params()).unwrap();
        restored.load_tables(&saved).unwrap();
        restored.save_tables(&resaved).unwrap();

        if matches!(kind, AgentKind::ValueIteration | AgentKind::PolicyIteration) {
            for state in env.states() {
                assert_eq!(
                    trained.choose_action(state),
                    restored.choose_action(state),
                    "{kind} at {state:?}"
                );
            }
        }
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&saved).unwrap() {
        let name = entry.unwrap().file_name();
        let before = fs::read(saved.join(&name)).unwrap();
        let after = fs::read(resaved.join(&name)).unwrap();
        assert_eq!(before, after, "{name:?} changed after a load");
        names.push(name.into_string().unwrap());
    }
    names.sort();
    assert_eq!(
        names,
        [
            "policy_pi.json",
            "policy_vi.json",
            "q_montecarlo.json",
            "q_qlearning.json",
            "v_pi.json",
            "v_vi.json",
        ]
    );

    fs::remove_dir_all(&saved).ok();
    fs::remove_dir_all(&resaved).ok();
}

#[test]
fn loading_a_table_for_another_grid_fails() {
    let dir = scratch_dir("shape");
    let path = dir.join("v.json");
    ValueTable::filled(4, 1.5).save(&path).unwrap();

    match ValueTable::load(&path, 6) {
        Err(TableError::ShapeMismatch { expected, found, .. }) => {
            assert_eq!(expected, vec![6, 6]);
            assert_eq!(found, vec![4, 4]);
        }
        other => panic!("expected a shape mismatch, got {other:?}"),
    }
    assert!(matches!(
        QTable::load(&path, 4),
        Err(TableError::ShapeMismatch { .. })
    ));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn agents_refuse_a_grid_of_another_size() {
    let small = GridWorld::new(GridConfig {
        size: 3,
        start: (0, 0),
        goals: vec![(2, 2)],
        obstacles: vec![],
        max_steps: 20,
    })
    .unwrap();
    let mut large = GridWorld::new(GridConfig::default()).unwrap();

    for kind in AgentKind::iter().filter(|&kind| kind != AgentKind::Random) {
        let mut agent = kind.build(&small, &params()).unwrap();
        assert_eq!(
            agent.train(&mut large, 10),
            Err(ConfigError::GridMismatch {
                expected: 3,
                found: 6
            }),
            "{kind}"
        );
        assert!(agent.train(&mut small.clone(), 10).is_ok(), "{kind}");
    }
}
