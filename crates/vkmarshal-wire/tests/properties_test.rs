//! Integration test: properties that hold for every struct and command of
//! the sample registry.

mod common;

use std::collections::HashSet;

use common::{set, FakeDriver};
use vkmarshal_types::extension::default_root_type_mappings;
use vkmarshal_types::sample::sample_registry;
use vkmarshal_types::{classify, needs_presence_check, STRUCTURE_TYPE_MAX_ENUM};
use vkmarshal_wire::{
    Codec, CountingStream, Decoder, Encoder, Frame, HandleMapping, Loopback, PacketHeader, StructValue, Value,
    WireError, WireReader, WireSink, WireWriter, HEADER_SIZE,
};

#[test]
fn test_zeroed_structs_round_trip() {
    let reg = sample_registry().unwrap();
    let codec = Codec::new(&reg, &default_root_type_mappings());
    for (compound, _) in reg.ordered_compounds() {
        let value = codec.zeroed_struct(&compound.name).unwrap();
        let mut w = WireWriter::new();
        codec
            .write_struct(&mut w, compound, &value, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap_or_else(|e| panic!("{}: {e}", compound.name));
        let bytes = w.into_inner();

        let mut r = WireReader::new(&bytes);
        let back = codec
            .read_struct(&mut r, compound, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
            .unwrap_or_else(|e| panic!("{}: {e}", compound.name));
        assert_eq!(back, value, "{} did not round trip", compound.name);
        assert_eq!(r.remaining(), 0, "{} left bytes unread", compound.name);
    }
}

#[test]
fn test_filled_struct_round_trips() {
    let reg = sample_registry().unwrap();
    let codec = Codec::new(&reg, &default_root_type_mappings());
    let mut app = codec.zeroed_struct("VkApplicationInfo").unwrap();
    app.set("pApplicationName", "demo");
    app.set("apiVersion", Value::Int(0x0040_3000));
    let mut info = codec.zeroed_struct("VkInstanceCreateInfo").unwrap();
    info.set("pApplicationInfo", app);
    info.set("enabledLayerCount", Value::Int(2));
    info.set(
        "ppEnabledLayerNames",
        Value::StrArray(vec!["VK_LAYER_one".into(), "VK_LAYER_two".into()]),
    );

    let compound = reg.compound("VkInstanceCreateInfo").unwrap();
    let mut w = WireWriter::new();
    codec
        .write_struct(&mut w, compound, &info, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap();
    let back = codec
        .read_struct(&mut WireReader::new(w.as_slice()), compound, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap();
    assert_eq!(back, info);
}

#[test]
fn test_packet_length_is_header_plus_counted_body() {
    let reg = sample_registry().unwrap();
    let encoder = Encoder::new(&reg);
    for (api, _) in reg.ordered_commands() {
        let params = encoder.zeroed_params(&api.name).unwrap();
        let packet = encoder
            .encode(&api.name, &params)
            .unwrap_or_else(|e| panic!("{}: {e}", api.name));
        let header = PacketHeader::parse(&packet).unwrap();
        assert_eq!(header.length as usize, packet.len(), "{}", api.name);
        assert_eq!(
            packet.len(),
            HEADER_SIZE + encoder.body_size(&api.name, &params).unwrap(),
            "{}",
            api.name
        );
    }
}

#[test]
fn test_every_command_survives_a_round_trip() {
    let reg = sample_registry().unwrap();
    let link = Loopback::new(Encoder::new(&reg), Decoder::new(&reg, FakeDriver::new()));
    for (api, _) in reg.ordered_commands() {
        let params = link.encoder().zeroed_params(&api.name).unwrap();
        let result = link
            .call(&api.name, params)
            .unwrap_or_else(|e| panic!("{}: {e}", api.name));
        if api.has_return() {
            assert_eq!(result.ret, Value::Int(0), "{}", api.name);
        } else {
            assert_eq!(result.ret, Value::Null, "{}", api.name);
        }
    }
}

#[test]
fn test_created_handles_resolve_on_both_sides() {
    let reg = sample_registry().unwrap();
    let link = Loopback::new(Encoder::new(&reg), Decoder::new(&reg, FakeDriver::new()));
    let mut locals = Vec::new();
    for _ in 0..3 {
        let params = link.encoder().zeroed_params("vkCreateInstance").unwrap();
        let result = link.call("vkCreateInstance", params).unwrap();
        locals.push(result.param("pInstance").and_then(Value::as_u64).unwrap());
    }

    let encoder = link.encoder();
    let decoder = link.decoder();
    let unique: HashSet<u64> = locals.iter().copied().collect();
    assert_eq!(unique.len(), 3);
    for (i, local) in locals.iter().enumerate() {
        let boxed = encoder.handles().unwrap(*local).unwrap();
        assert_eq!(encoder.handles().to_local(boxed), Some(*local));
        let driver = decoder.driver_handle(boxed).unwrap();
        assert_eq!(driver, common::FIRST_DRIVER_HANDLE + i as u64);
        assert_eq!(decoder.handles().to_local(driver), Some(boxed));
    }
}

#[test]
fn test_every_extension_struct_has_a_case() {
    let reg = sample_registry().unwrap();
    let codec = Codec::new(&reg, &default_root_type_mappings());
    for (compound, _) in reg.extension_structs() {
        let value = reg.structure_type_value(compound).unwrap();
        assert!(
            codec.dispatch().lookup(value, STRUCTURE_TYPE_MAX_ENUM).is_some(),
            "{} has no dispatch case",
            compound.name
        );
    }
    assert!(codec.dispatch().lookup(0x7FFF_FFF0, STRUCTURE_TYPE_MAX_ENUM).is_none());
}

#[test]
fn test_unknown_extension_is_skipped_on_write_and_rejected_on_read() {
    let reg = sample_registry().unwrap();
    let codec = Codec::new(&reg, &default_root_type_mappings());
    let stranger = StructValue::new("VkUnknownEXT")
        .with("sType", Value::Int(0x7FFF_FFF0))
        .with("pNext", Value::Null);

    let mut w = WireWriter::new();
    codec
        .write_extension(&mut w, &Value::Struct(stranger), STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap();
    assert_eq!(w.as_slice(), &[0]);

    let mut bytes = vec![1];
    bytes.extend(0x7FFF_FFF0u32.to_be_bytes());
    let err = codec
        .read_extension(&mut WireReader::new(&bytes), STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap_err();
    assert!(matches!(err, WireError::UnknownExtension(0x7FFF_FFF0)));
}

#[test]
fn test_opcodes_are_unique_and_cover_every_command() {
    let reg = sample_registry().unwrap();
    let encoder = Encoder::new(&reg);
    let opcodes = encoder.opcodes();
    let values: HashSet<u32> = opcodes.iter().map(|(op, _)| op).collect();
    assert_eq!(values.len(), opcodes.len());
    for (api, _) in reg.ordered_commands() {
        let op = opcodes.opcode(&api.name).unwrap();
        assert_eq!(opcodes.command(op), Some(api.name.as_str()));
    }
}

#[test]
fn test_absent_optional_pointers_take_one_byte() {
    let reg = sample_registry().unwrap();
    let codec = Codec::new(&reg, &default_root_type_mappings());
    for (compound, _) in reg.ordered_compounds() {
        let value = codec.zeroed_struct(&compound.name).unwrap();
        let frame = Frame::of_struct(compound, &value.fields);
        for member in compound.marshaled_members() {
            if !needs_presence_check(member, classify(member, &reg)) {
                continue;
            }
            let mut counter = CountingStream::new();
            let mut root = STRUCTURE_TYPE_MAX_ENUM;
            codec
                .write(&mut counter, member, &Value::Null, frame, &mut root, HandleMapping::none())
                .unwrap();
            assert_eq!(counter.bytes_written(), 1, "{}.{}", compound.name, member.param_name);
        }
    }
}

#[test]
fn test_present_optional_string_adds_its_bytes() {
    let reg = sample_registry().unwrap();
    let encoder = Encoder::new(&reg);
    let params = encoder.zeroed_params("vkEnumerateInstanceExtensionProperties").unwrap();
    let absent = encoder
        .body_size("vkEnumerateInstanceExtensionProperties", &params)
        .unwrap();

    let mut named = params.clone();
    set(&mut named, "pLayerName", "VK_LAYER_x");
    let present = encoder
        .body_size("vkEnumerateInstanceExtensionProperties", &named)
        .unwrap();
    assert_eq!(present, absent + 4 + "VK_LAYER_x".len() + 1);
}
