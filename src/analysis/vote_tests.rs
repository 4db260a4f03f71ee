use super::*;

const K: usize = 7;

fn smoother(window_size: usize) -> VoteSmoother {
    VoteSmoother::new(window_size, K, ClassId(1)).unwrap()
}

/// Feed a verdict stream and return (1-based verdict position, transition).
fn run(smoother: &mut VoteSmoother, stream: &[Option<u8>]) -> Vec<(usize, ClassTransition)> {
    stream
        .iter()
        .enumerate()
        .filter_map(|(i, v)| smoother.record(v.map(ClassId)).map(|t| (i + 1, t)))
        .collect()
}

fn ids(stream: &[u8]) -> Vec<Option<u8>> {
    stream.iter().copied().map(Some).collect()
}

fn histogram_sum(smoother: &VoteSmoother) -> usize {
    smoother.counts().iter().map(|&c| c as usize).sum()
}

#[test]
fn test_seeded_window() {
    let s = smoother(3);
    assert_eq!(s.current(), ClassId(1));
    assert_eq!(s.counts()[1], 3);
    assert_eq!(histogram_sum(&s), 3);
    assert_eq!(s.majority(), 2);
    assert_eq!(s.window().collect::<Vec<_>>(), vec![ClassId(1); 3]);
}

#[test]
fn test_rejects_even_window() {
    for window_size in [0, 2, 4] {
        assert!(matches!(
            VoteSmoother::new(window_size, K, ClassId(1)),
            Err(ConfigError::WindowSizeEven { .. })
        ));
    }
}

#[test]
fn test_rejects_bad_class_table() {
    assert!(VoteSmoother::new(3, 1, ClassId(0)).is_err());
    assert!(VoteSmoother::new(3, 7, ClassId(7)).is_err());
    assert!(VoteSmoother::new(3, 300, ClassId(0)).is_err());
}

#[test]
fn test_constant_stream_transitions_once_on_second_verdict() {
    // Seeded window: switches on the 2nd verdict, not the 3rd as a primed
    // window would (see test_hold_until_primed_delays_first_decision)
    let mut s = smoother(3);
    let transitions = run(&mut s, &ids(&[2, 2, 2, 2, 2]));

    assert_eq!(
        transitions,
        vec![(
            2,
            ClassTransition {
                from: ClassId(1),
                to: ClassId(2)
            }
        )]
    );
    assert_eq!(s.current(), ClassId(2));
}

#[test]
fn test_hold_until_primed_delays_first_decision() {
    let mut s = smoother(3).with_hold_until_primed(true);
    let transitions = run(&mut s, &ids(&[2, 2, 2, 2, 2]));

    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].0, 3, "first majority once the window is full");
    assert_eq!(s.current(), ClassId(2));
}

#[test]
fn test_alternating_stream_follows_window_majority() {
    let mut s = smoother(3);
    let transitions = run(&mut s, &ids(&[1, 2, 1, 2, 1]));

    // Two transitions, not at most one: the 2-majority at verdict 4 is real
    // Windows: [1,1,1] [1,1,2] [1,2,1] [2,1,2] [1,2,1]
    let positions: Vec<usize> = transitions.iter().map(|(i, _)| *i).collect();
    assert_eq!(positions, vec![4, 5]);
    assert_eq!(transitions[0].1.to, ClassId(2));
    assert_eq!(transitions[1].1.to, ClassId(1));
    assert_eq!(s.current(), ClassId(1));
}

#[test]
fn test_no_decision_is_not_voted() {
    let mut with_gaps = smoother(3);
    let mut without = smoother(3);

    let gapped = vec![None, Some(2), None, None, Some(2), None, Some(3)];
    let dense = ids(&[2, 2, 3]);

    let a: Vec<ClassTransition> = run(&mut with_gaps, &gapped).into_iter().map(|(_, t)| t).collect();
    let b: Vec<ClassTransition> = run(&mut without, &dense).into_iter().map(|(_, t)| t).collect();

    assert_eq!(a, b);
    assert_eq!(with_gaps.counts(), without.counts());
    assert_eq!(
        with_gaps.window().collect::<Vec<_>>(),
        without.window().collect::<Vec<_>>()
    );
}

#[test]
fn test_histogram_always_sums_to_window() {
    let mut s = smoother(5);
    let stream = [0u8, 3, 3, 6, 1, 2, 2, 2, 5, 4, 4, 0, 6, 6, 6];
    for id in stream {
        s.record(Some(ClassId(id)));
        assert_eq!(histogram_sum(&s), 5);
    }
    // Window holds the last 5 verdicts in arrival order
    assert_eq!(
        s.window().collect::<Vec<_>>(),
        vec![ClassId(4), ClassId(0), ClassId(6), ClassId(6), ClassId(6)]
    );
}

#[test]
fn test_repeated_majority_is_edge_triggered() {
    let mut s = smoother(3);
    let transitions = run(&mut s, &ids(&[6, 6, 6, 6, 6, 6, 6, 6, 6, 6]));
    assert_eq!(transitions.len(), 1);
}

#[test]
fn test_no_majority_keeps_current() {
    let mut s = smoother(5);
    // Window [3,4,5,6,0]: every class has one vote
    let transitions = run(&mut s, &ids(&[3, 4, 5, 6, 0]));
    assert!(transitions.is_empty());
    assert_eq!(s.current(), ClassId(1));
}

#[test]
fn test_tie_breaks_to_lowest_id() {
    // 2 and 4 end up tied at two votes each
    let mut s = smoother(5);
    run(&mut s, &ids(&[4, 4, 2, 2, 0]));
    let (leader, votes) = s.leader();
    assert_eq!((leader, votes), (ClassId(2), 2));
}

#[test]
fn test_out_of_range_verdict_rejected() {
    let mut s = smoother(3);
    assert_eq!(s.record(Some(ClassId(7))), None);
    assert_eq!(s.record(Some(ClassId(200))), None);
    assert_eq!(s.rejected(), 2);
    assert_eq!(s.counts()[1], 3, "window untouched");
}

#[test]
fn test_unknown_class_can_win() {
    let mut s = smoother(3);
    let transitions = run(&mut s, &ids(&[0, 0]));
    assert_eq!(transitions.len(), 1);
    assert_eq!(s.current(), ClassId::UNKNOWN);
}
