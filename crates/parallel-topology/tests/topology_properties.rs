use hashbrown::HashSet;
use parallel_topology::{
    DEFAULT_DEVICE_BUDGET, ParallelDegrees, ParallelDim, Topology, coordinates, decompose,
    is_admissible,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use strum::IntoEnumIterator;

/// Every combination of `values` over the six dimensions.
fn all_degrees(values: &[usize]) -> Vec<ParallelDegrees> {
    ParallelDim::iter().fold(vec![ParallelDegrees::ONES], |acc, dim| {
        acc.iter()
            .flat_map(|base| values.iter().map(move |&v| base.with(dim, v)))
            .collect()
    })
}

#[test]
fn decompose_is_a_bijection_onto_the_mesh() {
    let admissible = all_degrees(&[1, 2, 4])
        .into_iter()
        .filter(|d| is_admissible(d, DEFAULT_DEVICE_BUDGET));

    for degrees in admissible {
        let total = degrees.total_device_count();
        let group = degrees.tensor_expert_group_size();

        let image: HashSet<_> = coordinates(degrees)
            .map(|c| (c.pp_idx, c.dp_idx, c.cp_idx, c.tp_ep_idx))
            .collect();

        let mut product = HashSet::new();
        for pp in 0..degrees.pp {
            for dp in 0..degrees.dp {
                for cp in 0..degrees.cp {
                    for slot in 0..group {
                        product.insert((pp, dp, cp, slot));
                    }
                }
            }
        }

        assert_eq!(image.len(), total, "{degrees:?}");
        assert_eq!(image, product, "{degrees:?}");

        for coord in coordinates(degrees) {
            assert!(coord.tp_idx < degrees.tp);
            assert!(coord.ep_idx < degrees.ep);
            assert!(coord.etp_idx < coord.actual_etp);
        }
    }
}

#[test]
fn budget_check_matches_device_count() {
    for degrees in all_degrees(&[1, 2, 4, 8, 16]) {
        let total = degrees.dp * degrees.pp * degrees.cp * degrees.tp.max(degrees.ep * degrees.etp);

        assert_eq!(
            is_admissible(&degrees, DEFAULT_DEVICE_BUDGET),
            total <= DEFAULT_DEVICE_BUDGET,
            "{degrees:?}"
        );
    }
}

#[test]
fn inherited_etp_absorbs_spare_tensor_fan_out() {
    let inherited = ParallelDegrees {
        tp: 4,
        ep: 2,
        ..ParallelDegrees::ONES
    };
    assert!(coordinates(inherited).all(|c| c.actual_etp == 2));

    for tp in [1, 2, 4] {
        let explicit = ParallelDegrees {
            tp,
            ep: 2,
            etp: 2,
            ..ParallelDegrees::ONES
        };
        assert!(coordinates(explicit).all(|c| c.actual_etp == 2));
    }
}

#[test]
fn reset_is_idempotent() {
    let mut topology = Topology::default();
    topology.set_degree(ParallelDim::Tp, 4);
    topology.set_degree(ParallelDim::Cp, 2);

    topology.reset();
    let once = *topology.degrees();
    topology.reset();

    assert_eq!(once, ParallelDegrees::ONES);
    assert_eq!(*topology.degrees(), once);
}

#[test]
fn growing_any_dimension_at_capacity_is_rejected() {
    let at_capacity = all_degrees(&[1, 2, 4])
        .into_iter()
        .filter(|d| d.total_device_count() == DEFAULT_DEVICE_BUDGET);

    for degrees in at_capacity {
        let mut topology = Topology::default();
        for dim in ParallelDim::iter() {
            assert!(topology.set_degree(dim, degrees.get(dim)), "{degrees:?}");
        }
        assert_eq!(*topology.degrees(), degrees);

        for dim in ParallelDim::iter() {
            for value in [2, 4] {
                let candidate = degrees.with(dim, value);
                if candidate.total_device_count() > DEFAULT_DEVICE_BUDGET {
                    assert!(!topology.set_degree(dim, value));
                    assert_eq!(*topology.degrees(), degrees);
                }
            }
        }
    }
}

#[rstest]
#[case::single_device(ParallelDegrees::ONES, 0, 1, (0, 0, 0, 0, 0, 0, 0, 1))]
#[case::dp_tp(
    ParallelDegrees { dp: 2, tp: 4, ..ParallelDegrees::ONES },
    5, 8, (1, 1, 0, 1, 0, 1, 0, 4)
)]
#[case::inherited_etp(
    ParallelDegrees { tp: 4, ep: 2, ..ParallelDegrees::ONES },
    3, 4, (3, 3, 1, 1, 0, 0, 0, 2)
)]
#[case::explicit_etp(
    ParallelDegrees { tp: 2, ep: 2, etp: 2, ..ParallelDegrees::ONES },
    3, 4, (3, 1, 1, 1, 0, 0, 0, 2)
)]
fn reference_scenarios(
    #[case] degrees: ParallelDegrees,
    #[case] index: usize,
    #[case] total: usize,
    #[case] expected: (usize, usize, usize, usize, usize, usize, usize, usize),
) {
    let c = decompose(index, &degrees);

    assert_eq!(degrees.total_device_count(), total);
    assert_eq!(
        (
            c.tp_ep_idx,
            c.tp_idx,
            c.ep_idx,
            c.etp_idx,
            c.cp_idx,
            c.dp_idx,
            c.pp_idx,
            c.actual_etp
        ),
        expected
    );
}

#[test]
fn doubling_data_parallel_at_full_budget_is_rejected() {
    let mut topology = Topology::default();
    for dim in [ParallelDim::Dp, ParallelDim::Tp, ParallelDim::Pp, ParallelDim::Cp] {
        assert!(topology.set_degree(dim, 2));
    }
    assert_eq!(topology.total_device_count(), 16);

    assert!(!topology.set_degree(ParallelDim::Dp, 4));
    assert_eq!(topology.degrees().dp, 2);
}
