use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use stackplan::Dag;

// Node i may only depend on nodes 0..i, so every generated graph is acyclic.
fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = Dag<String>> {
    (1..=max_nodes).prop_flat_map(|num_nodes| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_nodes),
            num_nodes,
        )
        .prop_map(move |raw_deps| {
            let entries: Vec<(String, Vec<String>)> = raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let deps: BTreeSet<usize> = if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    (
                        format!("n{i}"),
                        deps.into_iter().map(|d| format!("n{d}")).collect(),
                    )
                })
                .collect();
            Dag::from_dependencies(entries).expect("generated graph is acyclic")
        })
    })
}

fn nodes(dag: &Dag<String>) -> Vec<String> {
    dag.nodes().cloned().collect()
}

proptest! {
    #[test]
    fn test_topological_sort_orders_dependencies(dag in dag_strategy(12)) {
        let mut order = dag.topological_sort().unwrap();
        prop_assert_eq!(order.len(), dag.size());

        order.reverse();
        let position: HashMap<&String, usize> =
            order.iter().enumerate().map(|(i, n)| (n, i)).collect();
        for (node, deps) in dag.to_dependencies() {
            for dep in deps {
                prop_assert!(position[&dep] < position[&node]);
            }
        }
    }

    #[test]
    fn test_transpose_round_trip(dag in dag_strategy(12)) {
        prop_assert_eq!(dag.transpose().transpose(), dag);
    }

    #[test]
    fn test_filter_keeps_subset_and_dependencies(
        dag in dag_strategy(12),
        picks in proptest::collection::vec(any::<usize>(), 1..4),
    ) {
        let all = nodes(&dag);
        let subset: Vec<String> = picks.iter().map(|p| all[p % all.len()].clone()).collect();

        let mut expected: BTreeSet<String> = subset.iter().cloned().collect();
        for node in &subset {
            expected.extend(dag.all_downstreams(node).unwrap());
        }

        let filtered = dag.filter(subset.iter()).unwrap();
        let actual: BTreeSet<String> = nodes(&filtered).into_iter().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_reduction_preserves_reachability(dag in dag_strategy(10)) {
        let reduced = dag.transitive_reduction();
        let all = nodes(&dag);
        for a in &all {
            for b in &all {
                prop_assert_eq!(dag.has_path(a, b).unwrap(), reduced.has_path(a, b).unwrap());
            }
        }
    }

    #[test]
    fn test_cyclic_edge_is_rejected_without_change(dag in dag_strategy(10)) {
        let all = nodes(&dag);
        for a in &all {
            for b in &all {
                if a == b || !dag.has_path(b, a).unwrap() {
                    continue;
                }
                let mut attempt = dag.clone();
                prop_assert!(attempt.add_edge(a, b).is_err());
                prop_assert_eq!(&attempt, &dag);
            }
        }
    }
}
