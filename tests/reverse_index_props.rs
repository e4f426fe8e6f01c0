//! Property tests: the reverse-call index always equals the group-by-callee
//! view of the forward edges, through insertions and removals.

use std::collections::BTreeMap;

use codemap::artifacts::{CallsArtifact, CallerRecord, EdgeRecord};
use codemap::model::{CallEdge, CallKind, Callee, EntityIdx, UnresolvedReason};
use codemap::resolve::CallGraph;
use proptest::prelude::*;

const ENTITIES: usize = 12;
const FILES: [&str; 3] = ["a.py", "b.py", "c.py"];

fn kind() -> impl Strategy<Value = CallKind> {
    prop_oneof![
        Just(CallKind::DirectCall),
        Just(CallKind::Callback),
        Just(CallKind::Inheritance),
        Just(CallKind::Override),
        Just(CallKind::Dynamic),
        Just(CallKind::External),
    ]
}

fn callee() -> impl Strategy<Value = Callee> {
    prop_oneof![
        4 => (0..ENTITIES).prop_map(|i| Callee::Entity(EntityIdx(i))),
        1 => prop_oneof![Just("get"), Just("run"), Just("x")].prop_map(|name| Callee::Unresolved {
            name: name.to_string(),
            reason: UnresolvedReason::NoCandidate,
        }),
    ]
}

fn edge() -> impl Strategy<Value = CallEdge> {
    (0..ENTITIES, callee(), kind(), 1usize..200, 0..FILES.len()).prop_map(
        |(caller, callee, kind, line, file)| CallEdge {
            caller: EntityIdx(caller),
            callee,
            kind,
            line,
            file: FILES[file].to_string(),
        },
    )
}

/// Reverse index recomputed from scratch.
fn grouped(graph: &CallGraph) -> BTreeMap<Callee, Vec<usize>> {
    let mut expected: BTreeMap<Callee, Vec<usize>> = BTreeMap::new();
    for (position, edge) in graph.edges().iter().enumerate() {
        expected.entry(edge.callee.clone()).or_default().push(position);
    }
    expected
}

proptest! {
    #[test]
    fn reverse_index_after_inserts(edges in prop::collection::vec(edge(), 0..80)) {
        let graph = CallGraph::from_edges(edges.clone());
        prop_assert_eq!(graph.len(), edges.len());
        prop_assert_eq!(graph.reverse_index(), &grouped(&graph));

        for target in 0..ENTITIES {
            let callee = Callee::Entity(EntityIdx(target));
            let via_index = graph.callers_of(&callee).count();
            let via_scan = graph.edges().iter().filter(|e| e.callee == callee).count();
            prop_assert_eq!(via_index, via_scan);
        }
    }

    #[test]
    fn reverse_index_after_removals(
        edges in prop::collection::vec(edge(), 0..80),
        removed_file in 0..FILES.len(),
        dropped_caller in 0..ENTITIES,
        extra in prop::collection::vec(edge(), 0..20),
    ) {
        let mut graph = CallGraph::from_edges(edges);
        graph.remove_file(FILES[removed_file]);
        prop_assert!(graph.edges().iter().all(|e| e.file != FILES[removed_file]));
        prop_assert_eq!(graph.reverse_index(), &grouped(&graph));

        graph.retain(|e| e.caller != EntityIdx(dropped_caller));
        prop_assert_eq!(graph.reverse_index(), &grouped(&graph));

        for edge in extra {
            graph.insert(edge);
        }
        prop_assert_eq!(graph.reverse_index(), &grouped(&graph));
        // no empty buckets survive a reindex or an insert
        prop_assert!(graph.reverse_index().values().all(|v| !v.is_empty()));
    }

    #[test]
    fn reverse_calls_artifact_matches_edges(
        raw in prop::collection::vec((0..ENTITIES, 0..ENTITIES, 1usize..100, 0..FILES.len()), 0..60),
    ) {
        let edges: Vec<EdgeRecord> = raw
            .iter()
            .map(|(from, to, line, file)| EdgeRecord {
                from: format!("func:f{}", from),
                to: format!("func:f{}", to),
                kind: CallKind::DirectCall,
                line: *line,
                file: FILES[*file].to_string(),
                unresolved: None,
            })
            .collect();
        let artifact = CallsArtifact::from_edges(false, edges);

        let mut expected: BTreeMap<String, Vec<CallerRecord>> = BTreeMap::new();
        for edge in &artifact.edges {
            expected.entry(edge.to.clone()).or_default().push(CallerRecord {
                caller: edge.from.clone(),
                file: edge.file.clone(),
                line: edge.line,
            });
        }
        prop_assert_eq!(&artifact.reverse_calls, &expected);
        let total: usize = artifact.reverse_calls.values().map(|v| v.len()).sum();
        prop_assert_eq!(total, raw.len());
    }
}
