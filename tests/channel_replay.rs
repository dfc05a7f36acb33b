mod harness;

use std::fs;

use anyhow::Result;
use proptest::prelude::*;
use tempfile::tempdir;

use harness::{init_tracing, take_recording, RemoteModel};
use vellum_composition::{
    Color, Composition, DashStyle, Property, ResourceId, RotateTransform, SolidColorBrush,
    TransformGroup, TranslateTransform,
};

#[test]
fn scene_lifecycle_replays_cleanly_on_both_channel_kinds() -> Result<()> {
    init_tracing();
    let composition = Composition::default();
    let mut state = composition.lock();
    let (in_band, in_band_queue) = state.open_memory_channel(false);
    let (out_of_band, out_of_band_queue) = state.open_memory_channel(true);

    let offset = state.create_resource(TranslateTransform::new(10.0, 0.0));
    let spin = state.create_resource(RotateTransform::new(45.0));
    let group = state.create_resource(TransformGroup::with_children(vec![offset, spin]));
    let brush = state.create_resource(SolidColorBrush {
        transform: Some(group),
        ..SolidColorBrush::new(Color::from_rgba8(255, 128, 0, 255))
    });
    let dashes = state.create_resource(DashStyle::dash());

    let mut remotes = [RemoteModel::default(), RemoteModel::default()];
    for (i, ch) in [in_band, out_of_band].into_iter().enumerate() {
        state.add_ref_on_channel(brush, ch)?;
        state.add_ref_on_channel(dashes, ch)?;
        state.commit_channel(ch)?;
        let queue = if i == 0 { &in_band_queue } else { &out_of_band_queue };
        remotes[i].apply_recording(&take_recording(queue))?;
    }

    state.set_scalar(offset, Property::X, 25.0)?;
    let nudge = state.create_resource(TranslateTransform::new(1.0, 1.0));
    state.push_child(group, nudge)?;
    state.remove_child(group, 0)?;
    state.set_sub_resource(brush, Property::RelativeTransform, Some(offset))?;
    state.set_dashes(dashes, [4.0, 1.0])?;
    state.commit_all()?;

    for (remote, queue) in remotes.iter_mut().zip([&in_band_queue, &out_of_band_queue]) {
        remote.apply_recording(&take_recording(queue))?;
        assert_eq!(remote.live.len(), 6);
        assert!(remote.translate_x.values().any(|&x| x == 25.0));
    }

    let channels = [(in_band, &in_band_queue), (out_of_band, &out_of_band_queue)];
    for ((ch, queue), remote) in channels.into_iter().zip(remotes.iter_mut()) {
        state.release_on_channel(brush, ch)?;
        state.release_on_channel(dashes, ch)?;
        state.commit_channel(ch)?;
        remote.apply_recording(&take_recording(queue))?;
        assert!(remote.live.is_empty(), "leaked {:?}", remote.live);
    }

    drop(state);
    let stats = composition.stats();
    assert_eq!(stats.resources_created, stats.resources_released);
    Ok(())
}

#[test]
fn recording_file_dumps_through_the_cli_library() -> Result<()> {
    let composition = Composition::default();
    let mut state = composition.lock();
    let (ch, queue) = state.open_memory_channel(false);
    let t = state.create_resource(TranslateTransform::new(3.0, 4.0));
    state.add_ref_on_channel(t, ch)?;
    state.commit_channel(ch)?;
    state.set_animation(t, Property::X, ch, vellum_composition::ResourceHandle(42))?;
    state.commit_channel(ch)?;

    let dir = tempdir()?;
    let path = dir.path().join("channel.vcmd");
    fs::write(&path, take_recording(&queue))?;

    let mut out = Vec::new();
    let summary = vellum_cmd_dump::dump(&fs::read(&path)?, &mut out, false)?;
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.packets, 3);

    let text = String::from_utf8(out)?;
    assert!(text.contains("TranslateTransform #1 x=3 y=4"));
    assert!(text.contains("TranslateTransform #1 x=anim(#42) y=4"));
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum Edit {
    AddRef(usize),
    Release(usize),
    SetX(usize, i8),
    SwapBrushTransform(Option<usize>),
    PushChild(usize),
    PopChild,
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..2).prop_map(Edit::AddRef),
        (0usize..2).prop_map(Edit::Release),
        (0usize..3, any::<i8>()).prop_map(|(t, x)| Edit::SetX(t, x)),
        proptest::option::of(0usize..3).prop_map(Edit::SwapBrushTransform),
        (0usize..3).prop_map(Edit::PushChild),
        Just(Edit::PopChild),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn remote_never_sees_a_dangling_handle(edits in proptest::collection::vec(edit_strategy(), 1..48)) {
        let composition = Composition::default();
        let mut state = composition.lock();
        let (ch, queue) = state.open_memory_channel(true);

        let leaves: Vec<ResourceId> = (0..3)
            .map(|i| state.create_resource(TranslateTransform::new(f64::from(i), 0.0)))
            .collect();
        let group = state.create_resource(TransformGroup::new());
        let brush = state.create_resource(SolidColorBrush::new(Color::BLACK));
        let roots = [group, brush];
        let mut held = [0u32; 2];

        for edit in edits {
            match edit {
                Edit::AddRef(r) => {
                    state.add_ref_on_channel(roots[r], ch).unwrap();
                    held[r] += 1;
                }
                Edit::Release(r) => {
                    if held[r] > 0 {
                        state.release_on_channel(roots[r], ch).unwrap();
                        held[r] -= 1;
                    }
                }
                Edit::SetX(t, x) => {
                    state.set_scalar(leaves[t], Property::X, f64::from(x)).unwrap();
                }
                Edit::SwapBrushTransform(t) => {
                    state
                        .set_sub_resource(brush, Property::Transform, t.map(|t| leaves[t]))
                        .unwrap();
                }
                Edit::PushChild(t) => {
                    state.push_child(group, leaves[t]).unwrap();
                }
                Edit::PopChild => {
                    let len = match state.resource(group) {
                        vellum_composition::Resource::TransformGroup(g) => g.children().len(),
                        _ => unreachable!(),
                    };
                    if len > 0 {
                        state.remove_child(group, len - 1).unwrap();
                    }
                }
            }
        }

        for (r, count) in held.iter().enumerate() {
            for _ in 0..*count {
                state.release_on_channel(roots[r], ch).unwrap();
            }
        }

        let mut remote = RemoteModel::default();
        prop_assert!(remote.apply_recording(&take_recording(&queue)).is_ok());
        prop_assert!(remote.live.is_empty());
        for id in leaves.iter().chain(&roots) {
            prop_assert_eq!(state.channel_count(*id), 0);
        }
    }
}
