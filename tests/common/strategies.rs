use proptest::prelude::*;

/// Random DAG over `size` tasks plus a scripted run: which tasks fail, and which in-flight
/// task finishes at each step
#[derive(Debug, Clone)]
pub struct DagScenario {
    pub size: usize,
    /// `(predecessor, successor)` with `predecessor < successor`, so always acyclic
    pub edges: Vec<(usize, usize)>,
    pub failures: Vec<bool>,
    pub completion_choices: Vec<usize>,
}

/// Strategy for acyclic task graphs of 1 to 8 tasks
pub fn dag_scenario_strategy() -> impl Strategy<Value = DagScenario> {
    (1usize..=8).prop_flat_map(|size| {
        let pairs: Vec<(usize, usize)> = (0..size)
            .flat_map(|successor| (0..successor).map(move |predecessor| (predecessor, successor)))
            .collect();
        let pair_count = pairs.len();
        (
            prop::collection::vec(prop::bool::weighted(0.4), pair_count)
                .prop_map(move |mask| {
                    pairs
                        .iter()
                        .zip(mask)
                        .filter(|(_, keep)| *keep)
                        .map(|(edge, _)| *edge)
                        .collect::<Vec<_>>()
                }),
            prop::collection::vec(prop::bool::weighted(0.15), size),
            prop::collection::vec(any::<usize>(), 1..16),
        )
            .prop_map(move |(edges, failures, completion_choices)| DagScenario {
                size,
                edges,
                failures,
                completion_choices,
            })
    })
}
