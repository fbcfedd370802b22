// VirtualMachine command implementations
//
// These are the fundamental commands for interacting with the JVM

use crate::commands::{command_sets, vm_commands};
use crate::connection::JdwpConnection;
use crate::protocol::{CommandPacket, JdwpError, JdwpResult};
use crate::reader::{read_i32, read_string};
use crate::types::IdSizes;
use serde::{Deserialize, Serialize};

/// JVM version information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmVersion {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
}

impl VmVersion {
    pub fn decode(mut data: &[u8]) -> JdwpResult<Self> {
        let description = read_string(&mut data)?;
        let jdwp_major = read_i32(&mut data)?;
        let jdwp_minor = read_i32(&mut data)?;
        let vm_version = read_string(&mut data)?;
        let vm_name = read_string(&mut data)?;

        Ok(Self {
            description,
            jdwp_major,
            jdwp_minor,
            vm_version,
            vm_name,
        })
    }
}

impl IdSizes {
    /// Decode the VirtualMachine.IDSizes reply body
    pub fn decode(mut data: &[u8]) -> JdwpResult<Self> {
        let mut next = || -> JdwpResult<usize> {
            let size = read_i32(&mut data)?;
            if !(1..=8).contains(&size) {
                return Err(JdwpError::Protocol(format!("Unsupported id size: {}", size)));
            }
            Ok(size as usize)
        };

        Ok(Self {
            field_id_size: next()?,
            method_id_size: next()?,
            object_id_size: next()?,
            reference_type_id_size: next()?,
            frame_id_size: next()?,
        })
    }
}

impl JdwpConnection {
    /// Get JVM version information (VirtualMachine.Version command)
    pub async fn get_version(&mut self) -> JdwpResult<VmVersion> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::VERSION);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        VmVersion::decode(reply.data())
    }

    /// Get ID sizes (VirtualMachine.IDSizes command)
    /// This tells us how many bytes are used for various ID types
    pub async fn get_id_sizes(&mut self) -> JdwpResult<IdSizes> {
        let id = self.next_id();
        let packet = CommandPacket::new(id, command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES);

        let reply = self.send_command(packet).await?;
        reply.check_error()?;

        IdSizes::decode(reply.data())
    }
}
