use std::collections::HashMap;

use proptest::prelude::*;

use vellum_composition::{
    BatchQueue, ChannelId, Composition, ResourceId, SolidColorBrush, TransformGroup,
    TranslateTransform,
};
use vellum_protocol::command::{decode_cmd_stream_le, CmdOpcode};

#[derive(Clone, Copy, Debug)]
enum Op {
    AddRef { resource: usize, channel: usize },
    Release { resource: usize, channel: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..4, 0usize..2).prop_map(|(resource, channel)| Op::AddRef { resource, channel }),
        (0usize..4, 0usize..2).prop_map(|(resource, channel)| Op::Release { resource, channel }),
    ]
}

fn count(batches: &[Vec<u8>], opcode: CmdOpcode) -> usize {
    batches
        .iter()
        .map(|batch| {
            let (_, packets) = decode_cmd_stream_le(batch).unwrap();
            packets.iter().filter(|p| p.opcode == Some(opcode)).count()
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balanced_add_ref_and_release_tears_everything_down(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let composition = Composition::default();
        let mut state = composition.lock();

        // A shared leaf referenced by a group and a brush, so nested counts overlap.
        let leaf = state.create_resource(TranslateTransform::new(1.0, 2.0));
        let other = state.create_resource(TranslateTransform::default());
        let group = state.create_resource(TransformGroup::with_children(vec![leaf, other]));
        let brush = state.create_resource(SolidColorBrush { transform: Some(leaf), ..SolidColorBrush::default() });
        let resources: [ResourceId; 4] = [leaf, other, group, brush];

        let channels: Vec<(ChannelId, BatchQueue)> =
            (0..2).map(|_| state.open_memory_channel(true)).collect();

        let mut outstanding: HashMap<(usize, usize), u32> = HashMap::new();
        for op in ops {
            match op {
                Op::AddRef { resource, channel } => {
                    state.add_ref_on_channel(resources[resource], channels[channel].0).unwrap();
                    *outstanding.entry((resource, channel)).or_default() += 1;
                }
                Op::Release { resource, channel } => {
                    let held = outstanding.entry((resource, channel)).or_default();
                    if *held == 0 {
                        continue;
                    }
                    *held -= 1;
                    state.release_on_channel(resources[resource], channels[channel].0).unwrap();
                }
            }
        }

        for ((resource, channel), held) in outstanding {
            for _ in 0..held {
                state.release_on_channel(resources[resource], channels[channel].0).unwrap();
            }
        }

        for id in resources {
            prop_assert_eq!(state.channel_count(id), 0);
        }
        for (_, queue) in &channels {
            // Out-of-band: every command is already its own committed batch.
            let batches = queue.drain();
            prop_assert_eq!(
                count(&batches, CmdOpcode::CreateResource),
                count(&batches, CmdOpcode::ReleaseResource)
            );
        }
    }
}
