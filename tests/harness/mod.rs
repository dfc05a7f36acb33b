#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::{bail, ensure, Context, Result};
use vellum_composition::BatchQueue;
use vellum_protocol::command::{
    decode_cmd_stream_le, VcmdCreateResource, VcmdReleaseResource, VcmdSolidColorBrushUpdate,
    VcmdTransformGroupUpdate, VcmdTranslateTransformUpdate,
};
use vellum_protocol::{CmdOpcode, ResourceHandle, ResourceType};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Concatenates everything committed to `queue` so far, as a recording file would hold it.
pub fn take_recording(queue: &BatchQueue) -> Vec<u8> {
    queue.drain().concat()
}

/// Minimal stand-in for the remote compositor: tracks live handles and rejects any command that
/// names a handle the client has not created (or already released).
#[derive(Debug, Default)]
pub struct RemoteModel {
    pub live: HashMap<ResourceHandle, ResourceType>,
    pub translate_x: HashMap<ResourceHandle, f64>,
    pub group_children: HashMap<ResourceHandle, Vec<ResourceHandle>>,
}

impl RemoteModel {
    pub fn apply_recording(&mut self, recording: &[u8]) -> Result<usize> {
        let mut offset = 0;
        let mut applied = 0;
        while offset < recording.len() {
            let (header, packets) = decode_cmd_stream_le(&recording[offset..])
                .with_context(|| format!("batch at offset {offset}"))?;
            for packet in packets {
                let Some(opcode) = packet.opcode else {
                    bail!("unknown opcode 0x{:x}", packet.hdr.opcode);
                };
                self.apply(opcode, packet.bytes)?;
                applied += 1;
            }
            offset += header.size_bytes as usize;
        }
        Ok(applied)
    }

    fn expect_live(&self, handle: ResourceHandle, resource_type: ResourceType) -> Result<()> {
        match self.live.get(&handle) {
            Some(&t) if t == resource_type => Ok(()),
            Some(&t) => bail!("{handle} is a {t:?}, not a {resource_type:?}"),
            None => bail!("{handle} is not live"),
        }
    }

    fn expect_live_or_null(&self, handle: ResourceHandle) -> Result<()> {
        ensure!(
            handle.is_null() || self.live.contains_key(&handle),
            "dangling reference to {handle}"
        );
        Ok(())
    }

    fn apply(&mut self, opcode: CmdOpcode, bytes: &[u8]) -> Result<()> {
        match opcode {
            CmdOpcode::Nop => {}
            CmdOpcode::CreateResource => {
                let cmd = VcmdCreateResource::decode_le(bytes)?;
                ensure!(
                    self.live.insert(cmd.handle, cmd.resource_type).is_none(),
                    "{} created twice",
                    cmd.handle
                );
            }
            CmdOpcode::ReleaseResource => {
                let cmd = VcmdReleaseResource::decode_le(bytes)?;
                self.expect_live(cmd.handle, cmd.resource_type)?;
                self.live.remove(&cmd.handle);
                self.translate_x.remove(&cmd.handle);
                self.group_children.remove(&cmd.handle);
            }
            CmdOpcode::TranslateTransformUpdate => {
                let cmd = VcmdTranslateTransformUpdate::decode_le(bytes)?;
                self.expect_live(cmd.handle, ResourceType::TranslateTransform)?;
                self.translate_x.insert(cmd.handle, cmd.x);
            }
            CmdOpcode::TransformGroupUpdate => {
                let (cmd, children) = VcmdTransformGroupUpdate::decode_le(bytes)?;
                self.expect_live(cmd.handle, ResourceType::TransformGroup)?;
                for &child in &children {
                    ensure!(!child.is_null(), "null child in {}", cmd.handle);
                    self.expect_live_or_null(child)?;
                }
                self.group_children.insert(cmd.handle, children);
            }
            CmdOpcode::SolidColorBrushUpdate => {
                let cmd = VcmdSolidColorBrushUpdate::decode_le(bytes)?;
                self.expect_live(cmd.handle, ResourceType::SolidColorBrush)?;
                self.expect_live_or_null(cmd.transform)?;
                self.expect_live_or_null(cmd.relative_transform)?;
            }
            CmdOpcode::ScaleTransformUpdate
            | CmdOpcode::RotateTransformUpdate
            | CmdOpcode::DashStyleUpdate => {
                // Only the handle matters here; every update starts with hdr + handle.
                let handle = ResourceHandle(u32::from_le_bytes([
                    bytes[8], bytes[9], bytes[10], bytes[11],
                ]));
                ensure!(self.live.contains_key(&handle), "update for dead {handle}");
            }
        }
        Ok(())
    }
}
