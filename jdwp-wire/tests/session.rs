// Session tests against a scripted VM on the other end of an in-memory pipe

use bytes::BufMut;
use jdwp_wire::commands::{command_sets, event_kinds, event_set_commands, vm_commands};
use jdwp_wire::eventloop::{read_frame, MAX_PACKET_SIZE};
use jdwp_wire::string::{decode_string, put_string};
use jdwp_wire::writer::{put_location, put_object_id};
use jdwp_wire::{
    CommandPacket, ConnectionConfig, EventKind, IdSizes, JdwpConnection, JdwpError, Location,
    Packet, ReplyPacket, ThreadLocation,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("jdwp_wire=debug")
        .with_test_writer()
        .try_init();
}

fn session(config: ConnectionConfig) -> (JdwpConnection, DuplexStream) {
    init_tracing();
    let (client, vm) = tokio::io::duplex(1 << 16);
    (JdwpConnection::from_stream(client, &config), vm)
}

async fn next_command(vm: &mut DuplexStream) -> CommandPacket {
    let frame = read_frame(vm, MAX_PACKET_SIZE).await.unwrap();
    match Packet::decode(&frame).unwrap() {
        Packet::Command(cmd) => cmd,
        other => panic!("VM expected a command, got {:?}", other),
    }
}

fn id_sizes_body(sizes: &IdSizes) -> Vec<u8> {
    let mut data = Vec::new();
    data.put_i32(sizes.field_id_size as i32);
    data.put_i32(sizes.method_id_size as i32);
    data.put_i32(sizes.object_id_size as i32);
    data.put_i32(sizes.reference_type_id_size as i32);
    data.put_i32(sizes.frame_id_size as i32);
    data
}

fn method_entry_packet(id: u32, request_id: i32, at: &ThreadLocation, sizes: &IdSizes) -> Vec<u8> {
    let mut packet = CommandPacket::new(id, command_sets::EVENT, event_set_commands::COMPOSITE);
    packet.data.put_u8(1); // suspend event thread
    packet.data.put_i32(1);
    packet.data.put_u8(event_kinds::METHOD_ENTRY);
    packet.data.put_i32(request_id);
    put_object_id(&mut packet.data, at.thread, sizes);
    put_location(&mut packet.data, &at.location, sizes);
    packet.encode()
}

fn sample_entry() -> ThreadLocation {
    ThreadLocation {
        thread: 0x42,
        location: Location {
            type_tag: 1,
            class_id: 0x1000,
            method_id: 0x2000,
            index: 3,
        },
    }
}

#[tokio::test]
async fn event_before_reply_is_routed_separately() {
    let (mut conn, mut vm) = session(ConnectionConfig::default());
    let entry = sample_entry();

    let vm_task = tokio::spawn(async move {
        let cmd = next_command(&mut vm).await;
        assert_eq!(
            (cmd.command_set, cmd.command),
            (command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES)
        );

        let sizes = IdSizes::default();
        vm.write_all(&method_entry_packet(900, 7, &entry, &sizes))
            .await
            .unwrap();
        vm.write_all(&ReplyPacket::new(cmd.id, 0, id_sizes_body(&sizes)).encode())
            .await
            .unwrap();
        vm
    });

    let sizes = conn.get_id_sizes().await.unwrap();
    assert_eq!(sizes, IdSizes::default());

    let set = conn.recv_event().await.expect("event set");
    assert_eq!(set.suspend_policy, 1);
    assert_eq!(set.events.len(), 1);
    assert_eq!(set.events[0].request_id, 7);
    assert_eq!(set.events[0].details, EventKind::MethodEntry(entry));

    vm_task.await.unwrap();
}

#[tokio::test]
async fn late_reply_after_deadline_is_dropped() {
    let config = ConnectionConfig {
        reply_timeout: Some(Duration::from_millis(100)),
        ..ConnectionConfig::default()
    };
    let (mut conn, mut vm) = session(config);
    let narrow = IdSizes {
        object_id_size: 4,
        ..IdSizes::default()
    };

    let vm_task = tokio::spawn(async move {
        let slow = next_command(&mut vm).await;
        // Only answer the first command once the second one shows up
        let fast = next_command(&mut vm).await;
        assert_eq!((slow.id, fast.id), (1, 2));
        assert_eq!(fast.command, vm_commands::ID_SIZES);

        // The late reply carries a body that would not decode as IDSizes
        vm.write_all(&ReplyPacket::new(slow.id, 0, vec![0xff]).encode())
            .await
            .unwrap();
        vm.write_all(&ReplyPacket::new(fast.id, 0, id_sizes_body(&narrow)).encode())
            .await
            .unwrap();

        // A second answer to the late command is ignored as well
        vm.write_all(&ReplyPacket::new(slow.id, 0, Vec::new()).encode())
            .await
            .unwrap();

        let third = next_command(&mut vm).await;
        assert_eq!(third.id, 3);
        vm.write_all(&ReplyPacket::new(third.id, 0, id_sizes_body(&narrow)).encode())
            .await
            .unwrap();
        vm
    });

    match conn.get_version().await {
        Err(JdwpError::Timeout(id)) => assert_eq!(id, 1),
        other => panic!("expected timeout, got {:?}", other),
    }

    // The reply handed back is the one for id 2, not the stale one for id 1
    assert_eq!(conn.get_id_sizes().await.unwrap(), narrow);

    // The loop is still routing replies after dropping the stale ones
    assert_eq!(conn.get_id_sizes().await.unwrap(), narrow);
    assert!(conn.try_recv_event().await.is_none());

    vm_task.await.unwrap();
}

#[tokio::test]
async fn narrow_id_sizes_apply_to_events() {
    let (mut conn, mut vm) = session(ConnectionConfig::default());
    let narrow = IdSizes {
        object_id_size: 4,
        reference_type_id_size: 4,
        method_id_size: 4,
        ..IdSizes::default()
    };
    let entry = sample_entry();

    let vm_task = tokio::spawn(async move {
        let cmd = next_command(&mut vm).await;
        vm.write_all(&ReplyPacket::new(cmd.id, 0, id_sizes_body(&narrow)).encode())
            .await
            .unwrap();

        // Wait for a second command so the new sizes are in place first
        let cmd = next_command(&mut vm).await;
        vm.write_all(&method_entry_packet(1, 3, &entry, &narrow))
            .await
            .unwrap();
        vm.write_all(&ReplyPacket::new(cmd.id, 0, vec![0, 0, 0, 3]).encode())
            .await
            .unwrap();
        vm
    });

    assert_eq!(conn.refresh_id_sizes().await.unwrap(), narrow);
    assert_eq!(conn.id_sizes(), narrow);

    let request_id = conn
        .request_method_entry(Some("com.example.*"), jdwp_wire::SuspendPolicy::EventThread)
        .await
        .unwrap();
    assert_eq!(request_id, 3);

    let set = conn.recv_event().await.expect("event set");
    assert_eq!(set.events[0].details, EventKind::MethodEntry(entry));

    vm_task.await.unwrap();
}

#[tokio::test]
async fn create_string_sends_modified_utf8() -> anyhow::Result<()> {
    let (mut conn, mut vm) = session(ConnectionConfig::default());

    let vm_task = tokio::spawn(async move {
        let cmd = next_command(&mut vm).await;
        assert_eq!(cmd.command, vm_commands::CREATE_STRING);

        let mut data = cmd.data();
        assert_eq!(decode_string(&mut data).unwrap(), "h\u{e9}llo\0");
        assert!(data.is_empty());

        let mut reply = Vec::new();
        reply.put_u64(0xfeed);
        vm.write_all(&ReplyPacket::new(cmd.id, 0, reply).encode())
            .await
            .unwrap();

        let cmd = next_command(&mut vm).await;
        let mut reply = Vec::new();
        put_string(&mut reply, "h\u{e9}llo\0").unwrap();
        vm.write_all(&ReplyPacket::new(cmd.id, 0, reply).encode())
            .await
            .unwrap();
        vm
    });

    let string_id = conn.create_string("h\u{e9}llo\0").await?;
    assert_eq!(string_id, 0xfeed);
    assert_eq!(conn.get_string_value(string_id).await?, "h\u{e9}llo\0");

    vm_task.await?;
    Ok(())
}

#[tokio::test]
async fn error_reply_surfaces_code() {
    let (mut conn, mut vm) = session(ConnectionConfig::default());

    let vm_task = tokio::spawn(async move {
        let cmd = next_command(&mut vm).await;
        vm.write_all(&ReplyPacket::new(cmd.id, 112, Vec::new()).encode())
            .await
            .unwrap();
        vm
    });

    match conn.get_version().await {
        Err(JdwpError::JdwpErrorCode(112, name)) => assert_eq!(name, "VM_DEAD"),
        other => panic!("expected VM_DEAD, got {:?}", other),
    }

    vm_task.await.unwrap();
}

#[tokio::test]
async fn closed_stream_fails_pending_command() {
    let (mut conn, mut vm) = session(ConnectionConfig {
        reply_timeout: None,
        ..ConnectionConfig::default()
    });

    tokio::spawn(async move {
        next_command(&mut vm).await;
        drop(vm);
    });

    assert!(matches!(
        conn.get_version().await,
        Err(JdwpError::ConnectionClosed)
    ));
}
