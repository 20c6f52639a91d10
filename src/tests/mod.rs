//! gmon-profile tests module: end to end properties of the aggregation.


use std::io::Cursor;

use crate::callgraph::CallGraph;
use crate::error::Error;
use crate::gmon::{self, Layout};
use crate::samples::Samples;
use crate::symbols::{nm, SymbolTable};
use crate::tree::Profile;
use mock::{foo_bar_table, program_gmon, program_table, symbol, GmonBuilder};

fn build<'t>(table: &'t SymbolTable, bytes: &[u8]) -> Profile<'t> {
    let data = gmon::decode(bytes, &Layout::default()).unwrap();
    Profile::build(table, Samples::from_gmon(&data, table)).unwrap()
}

#[test]
fn two_symbols_share_a_histogram() {
    let table = foo_bar_table();
    let bytes = GmonBuilder::new(Layout::default())
        .histogram(0x1000, 0x1040, 100, &[5, 0, 3, 2])
        .build();
    let profile = build(&table, &bytes);

    assert_eq!(profile.find("foo").unwrap().self_samples(), 5);
    assert_eq!(profile.find("bar").unwrap().self_samples(), 5);
    assert_eq!(profile.file(Some("foo.c")).unwrap().self_samples(), 5);
    assert_eq!(profile.file(Some("bar.c")).unwrap().self_samples(), 5);
}

#[test]
fn mutual_recursion_forms_one_cycle() {
    let table = SymbolTable::new(vec![
        symbol("A", 0x1000, 0x1100, Some("ab.c")),
        symbol("B", 0x1100, 0x1200, Some("ab.c")),
    ]);
    let bytes = GmonBuilder::new(Layout::default())
        .histogram(0x1000, 0x1200, 100, &[6, 2])
        .arc(0x1010, 0x1100, 10)
        .arc(0x1110, 0x1000, 4)
        .build();
    let profile = build(&table, &bytes);

    assert_eq!(profile.cycles().len(), 1);
    let cycle = &profile.cycles()[0];
    assert_eq!(cycle.members().len(), 2);
    let head = profile.symbol(cycle.head()).unwrap();
    assert_eq!(head.name(), "A");
    assert_eq!(head.cumulative_samples(), 8.0);
    assert_eq!(profile.find("B").unwrap().cycle().map(|c| c.number()), Some(1));
}

#[test]
fn unresolved_arc_is_reported() {
    let table = foo_bar_table();
    let bytes = GmonBuilder::new(Layout::default())
        .histogram(0x1000, 0x1040, 100, &[1, 0, 0, 1])
        .arc(0x1008, 0x1020, 3)
        .arc(0x1008, 0x9000, 2)
        .build();
    let profile = build(&table, &bytes);

    assert_eq!(profile.diagnostics().len(), 1);
    match &profile.diagnostics()[0] {
        Error::UnresolvedAddress { address, .. } => assert_eq!(*address, 0x9000),
        other => panic!("Unexpected diagnostic {:?}", other),
    }
    assert_eq!(profile.call_graph().nodes().len(), 2);
    assert_eq!(profile.find("foo").unwrap().calls_out(), 3);
}

#[test]
fn unresolved_call_sites_are_reported() {
    let table = foo_bar_table();
    let bytes = GmonBuilder::new(Layout::default())
        .histogram(0x1000, 0x1040, 100, &[1, 0, 0, 1])
        .arc(0x1008, 0x1020, 3)
        .arc(0x500, 0x1020, 2)
        .arc(0x600, 0x9000, 4)
        .build();
    let profile = build(&table, &bytes);

    let unresolved: Vec<(u64, bool)> = profile
        .diagnostics()
        .iter()
        .map(|d| match d {
            Error::UnresolvedAddress { address, context } => {
                (*address, context.starts_with("call site"))
            }
            other => panic!("Unexpected diagnostic {:?}", other),
        })
        .collect();
    // Both ends of the last arc are reported
    assert_eq!(
        unresolved,
        vec![(0x500, true), (0x600, true), (0x9000, false)]
    );

    let bar = profile.find("bar").unwrap();
    assert_eq!(bar.calls_in(), 3);
    assert_eq!(bar.callers().count(), 1);
    assert_eq!(profile.call_graph().nodes().len(), 2);
}

#[test]
fn sum_and_attribution_invariants() {
    let table = SymbolTable::new(vec![
        symbol("main", 0x1000, 0x1100, Some("main.c")),
        symbol("helper", 0x1100, 0x1180, Some("main.c")),
        symbol("util", 0x1200, 0x1300, Some("util.c")),
        symbol("anon", 0x1300, 0x1340, None),
    ]);
    let counts: Vec<u32> = (0..32).map(|i| (i * 7 % 5) as u32).collect();
    let bytes = GmonBuilder::new(Layout::default())
        .histogram(0x1000, 0x1400, 100, &counts)
        .build();
    let data = gmon::decode(&bytes, &Layout::default()).unwrap();
    let profile = Profile::build(&table, Samples::from_gmon(&data, &table)).unwrap();

    assert_eq!(
        data.total_samples(),
        profile.attributed_samples() + profile.unattributed_samples()
    );
    assert!(profile.unattributed_samples() > 0);
    let mut attributed = 0;
    for file in profile.files() {
        let sum: u64 = file.symbols().map(|s| s.self_samples()).sum();
        assert_eq!(sum, file.self_samples());
        attributed += sum;
    }
    assert_eq!(attributed, profile.attributed_samples());
    let percent: f64 = profile.files().map(|f| f.percentage()).sum();
    assert!((percent - 100.0).abs() < 1e-9);
}

#[test]
fn merging_doubles_every_total() {
    let table = program_table();
    let data = gmon::decode(&program_gmon(), &Layout::default()).unwrap();
    let single = Profile::build(&table, Samples::from_gmon(&data, &table)).unwrap();
    let mut merged = Samples::from_gmon(&data, &table);
    merged.merge(Samples::from_gmon(&data, &table));
    let double = Profile::build(&table, merged).unwrap();

    assert_eq!(double.total_samples(), 2 * single.total_samples());
    for file in single.files() {
        let other = double.file(file.path()).unwrap();
        assert_eq!(other.self_samples(), 2 * file.self_samples());
        for s in file.symbols() {
            let d = double.symbol(s.id()).unwrap();
            assert_eq!(d.self_samples(), 2 * s.self_samples());
            assert_eq!(d.calls_in(), 2 * s.calls_in());
            assert_eq!(d.cumulative_samples(), 2.0 * s.cumulative_samples());
        }
    }
}

#[test]
fn cycles_are_closed_under_reachability() {
    // Two rings bridged one way plus a tail: 0<->1<->2, 3->4->5->3, 2->3, 5->6
    let table = SymbolTable::new(
        (0..7)
            .map(|i| symbol(&format!("f{}", i), 0x100 * (i + 1), 0x100 * (i + 2), None))
            .collect(),
    );
    let mut builder = GmonBuilder::new(Layout::default());
    for (f, t) in [(0, 1), (1, 0), (1, 2), (2, 1), (2, 3), (3, 4), (4, 5), (5, 3), (5, 6)] {
        builder = builder.arc(0x100 * (f + 1), 0x100 * (t + 1), 1);
    }
    let data = gmon::decode(&builder.build(), &Layout::default()).unwrap();
    let samples = Samples::from_gmon(&data, &table);
    let graph = CallGraph::build(&samples).unwrap();

    let cycle_of = |name: &str| graph.node(table.find(name).unwrap()).unwrap().cycle();
    assert_eq!(graph.cycles().len(), 2);
    assert!(cycle_of("f0").is_some());
    assert_eq!(cycle_of("f0"), cycle_of("f1"));
    assert_eq!(cycle_of("f1"), cycle_of("f2"));
    assert_eq!(cycle_of("f3"), cycle_of("f4"));
    assert_eq!(cycle_of("f4"), cycle_of("f5"));
    assert_ne!(cycle_of("f0"), cycle_of("f3"));
    assert_eq!(cycle_of("f6"), None);
    for node in graph.nodes() {
        assert!(node.cumulative_samples() >= node.self_samples() as f64);
    }
}

#[test]
fn listing_to_profile() {
    let table = nm::parse(Cursor::new(mock::PROGRAM_NM)).unwrap();
    let profile = build(&table, &program_gmon());
    let paths: Vec<Option<&str>> = profile.files().map(|f| f.path()).collect();
    assert_eq!(paths, vec![Some("/src/main.c"), Some("/src/rec.c"), None]);
    assert_eq!(profile.find("main").unwrap().cumulative_samples(), 10.0);
}
