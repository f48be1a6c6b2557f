//! Integration test: guest encoder and host decoder over the sample registry.
//!
//! Checks exact packet layouts for representative commands, mapped-memory
//! coherence, extension chains, and the decoder's handling of unknown
//! opcodes and repeated destroys.

mod common;

use std::sync::Arc;

use common::{param, set, FakeDriver, FIRST_DRIVER_HANDLE};
use parking_lot::Mutex;
use vkmarshal_types::sample::sample_registry;
use vkmarshal_types::{TypeRegistry, VulkanApi, STRUCTURE_TYPE_MAX_ENUM};
use vkmarshal_wire::{
    CallResult, Decoder, DecoderState, Encoder, HandleMapping, Loopback, PacketHeader, SnapshotHook, StructValue,
    Transport, Value, WireError, WireReader, WireSink, WireWriter, HEADER_SIZE, WHOLE_SIZE,
};

const DRIVER_DEVICE: u64 = 0xD0D0;
const DRIVER_MEMORY: u64 = 0xAA00;

fn s_type(reg: &TypeRegistry, literal: &str) -> u64 {
    reg.enum_value(literal).unwrap() as u64
}

/// Register a device created out of band on both sides; returns the
/// application handle.
fn seed_handle(encoder: &Encoder<'_>, decoder: &Decoder<'_, FakeDriver>, driver_handle: u64) -> u64 {
    let boxed = decoder.handles().create(driver_handle);
    encoder.handles().create(boxed)
}

fn pair(reg: &TypeRegistry) -> (Encoder<'_>, Decoder<'_, FakeDriver>) {
    (Encoder::new(reg), Decoder::new(reg, FakeDriver::new()))
}

fn create_instance_params(encoder: &Encoder<'_>) -> Vec<(String, Value)> {
    let mut info = encoder.codec().zeroed_struct("VkInstanceCreateInfo").unwrap();
    info.set("enabledExtensionCount", Value::Int(1));
    info.set("ppEnabledExtensionNames", Value::StrArray(vec!["VK_KHR_surface".into()]));
    let mut params = encoder.zeroed_params("vkCreateInstance").unwrap();
    set(&mut params, "pCreateInfo", info);
    params
}

#[test]
fn test_create_instance_packet_layout() {
    let reg = sample_registry().unwrap();
    let (encoder, mut decoder) = pair(&reg);
    let params = create_instance_params(&encoder);

    let packet = encoder.encode("vkCreateInstance", &params).unwrap();
    let header = PacketHeader::parse(&packet).unwrap();
    assert_eq!(Some(header.opcode), encoder.opcodes().opcode("vkCreateInstance"));
    assert_eq!(header.length as usize, packet.len());

    let mut expected = Vec::new();
    expected.extend(1u32.to_be_bytes()); // sType
    expected.push(0); // pNext
    expected.extend(0u32.to_be_bytes()); // flags
    expected.push(0); // pApplicationInfo absent
    expected.extend(0u32.to_be_bytes()); // enabledLayerCount
    expected.extend(0u32.to_be_bytes()); // layer name count
    expected.extend(1u32.to_be_bytes()); // enabledExtensionCount
    expected.extend(1u32.to_be_bytes()); // extension name count
    expected.extend(15u32.to_be_bytes());
    expected.extend(b"VK_KHR_surface\0");
    expected.push(0); // pAllocator absent
    expected.extend(0u64.to_be_bytes()); // pInstance
    assert_eq!(&packet[HEADER_SIZE..], expected.as_slice());
    assert_eq!(packet.len(), HEADER_SIZE + encoder.body_size("vkCreateInstance", &params).unwrap());

    let mut response = Vec::new();
    assert_eq!(decoder.decode(&packet, &mut response).unwrap(), packet.len());
    let boxed = decoder.handles().to_local(FIRST_DRIVER_HANDLE).unwrap();
    let mut expected = boxed.to_be_bytes().to_vec();
    expected.extend(0u32.to_be_bytes());
    assert_eq!(response, expected);

    let info = decoder.driver().last("vkCreateInstance").unwrap();
    let names = param(info, "pCreateInfo").as_struct().unwrap().get("ppEnabledExtensionNames");
    assert_eq!(names, Some(&Value::StrArray(vec!["VK_KHR_surface".into()])));

    let result = encoder.decode_response("vkCreateInstance", params, &response).unwrap();
    assert_eq!(result.ret, Value::Int(0));
    let Value::Handle(local) = *result.param("pInstance").unwrap() else {
        panic!("pInstance is not a handle");
    };
    assert_eq!(encoder.handles().unwrap(local), Some(boxed));
    assert_eq!(decoder.driver_handle(boxed).unwrap(), FIRST_DRIVER_HANDLE);
}

#[test]
fn test_instance_lifetime_through_loopback() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let params = create_instance_params(&encoder);
    let link = Loopback::new(encoder, decoder);

    let created = link.call("vkCreateInstance", params).unwrap();
    let instance = created.param("pInstance").cloned().unwrap();
    assert_eq!(link.encoder().handles().len(), 1);
    assert_eq!(link.decoder().handles().len(), 1);

    let mut params = link.encoder().zeroed_params("vkDestroyInstance").unwrap();
    set(&mut params, "instance", instance);
    let destroyed = link.call("vkDestroyInstance", params).unwrap();
    assert_eq!(destroyed.ret, Value::Null);

    assert!(link.encoder().handles().is_empty());
    assert!(link.decoder().handles().is_empty());
    let decoder = link.decoder();
    let seen = decoder.driver().last("vkDestroyInstance").unwrap();
    assert_eq!(param(seen, "instance"), &Value::Handle(FIRST_DRIVER_HANDLE));
}

fn mapped_range(encoder: &Encoder<'_>, memory: u64, offset: u64, size: u64) -> StructValue {
    let mut range = encoder.codec().zeroed_struct("VkMappedMemoryRange").unwrap();
    range.set("memory", Value::Handle(memory));
    range.set("offset", Value::Int(offset));
    range.set("size", Value::Int(size));
    range
}

fn range_params(encoder: &Encoder<'_>, api: &str, device: u64, range: StructValue) -> Vec<(String, Value)> {
    let mut params = encoder.zeroed_params(api).unwrap();
    set(&mut params, "device", Value::Handle(device));
    set(&mut params, "memoryRangeCount", Value::Int(1));
    set(&mut params, "pMemoryRanges", Value::Array(vec![Value::Struct(range)]));
    params
}

#[test]
fn test_flush_streams_mapped_bytes() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let memory = seed_handle(&encoder, &decoder, DRIVER_MEMORY);
    let pattern: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
    encoder.memory().map(memory, pattern.clone());
    decoder.memory().map(DRIVER_MEMORY, vec![0; 4096]);

    let params = range_params(&encoder, "vkFlushMappedMemoryRanges", device, mapped_range(&encoder, memory, 0, 4096));
    let packet = encoder.encode("vkFlushMappedMemoryRanges", &params).unwrap();
    let body = &packet[HEADER_SIZE..];
    // device, count, then the 29-byte range, then the payload.
    assert_eq!(body.len(), 8 + 4 + 29 + 8 + 4096);
    assert_eq!(&body[8..12], &1u32.to_be_bytes());
    assert_eq!(&body[41..49], &4096u64.to_be_bytes());
    assert_eq!(&body[49..], pattern.as_slice());

    let link = Loopback::new(encoder, decoder);
    let result = link.call("vkFlushMappedMemoryRanges", params).unwrap();
    assert_eq!(result.ret, Value::Int(0));

    let decoder = link.decoder();
    assert_eq!(decoder.memory().read(DRIVER_MEMORY, 0, 4096), Some(pattern));
    let seen = decoder.driver().last("vkFlushMappedMemoryRanges").unwrap();
    assert_eq!(param(seen, "device"), &Value::Handle(DRIVER_DEVICE));
    let ranges = param(seen, "pMemoryRanges").structs();
    assert_eq!(ranges[0].get("memory"), Some(&Value::Handle(DRIVER_MEMORY)));
}

#[test]
fn test_flush_whole_size_sends_the_tail() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let memory = seed_handle(&encoder, &decoder, DRIVER_MEMORY);
    encoder.memory().map(memory, vec![0xEE; 4096]);
    decoder.memory().map(DRIVER_MEMORY, vec![0; 4096]);

    let range = mapped_range(&encoder, memory, 1024, WHOLE_SIZE);
    let params = range_params(&encoder, "vkFlushMappedMemoryRanges", device, range);
    let link = Loopback::new(encoder, decoder);
    link.call("vkFlushMappedMemoryRanges", params).unwrap();

    let decoder = link.decoder();
    assert_eq!(decoder.memory().read(DRIVER_MEMORY, 0, 1024), Some(vec![0; 1024]));
    assert_eq!(decoder.memory().read(DRIVER_MEMORY, 1024, 3072), Some(vec![0xEE; 3072]));
}

#[test]
fn test_flush_of_unmapped_memory_sends_zero_length() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let memory = seed_handle(&encoder, &decoder, DRIVER_MEMORY);

    let params = range_params(&encoder, "vkFlushMappedMemoryRanges", device, mapped_range(&encoder, memory, 0, 64));
    let packet = encoder.encode("vkFlushMappedMemoryRanges", &params).unwrap();
    assert_eq!(&packet[packet.len() - 8..], &0u64.to_be_bytes());

    let link = Loopback::new(encoder, decoder);
    assert_eq!(link.call("vkFlushMappedMemoryRanges", params).unwrap().ret, Value::Int(0));
}

#[test]
fn test_invalidate_brings_host_bytes_back() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let memory = seed_handle(&encoder, &decoder, DRIVER_MEMORY);
    encoder.memory().map(memory, vec![0; 256]);
    decoder.memory().map(DRIVER_MEMORY, vec![0x5A; 256]);

    let params = range_params(&encoder, "vkInvalidateMappedMemoryRanges", device, mapped_range(&encoder, memory, 0, 128));
    let link = Loopback::new(encoder, decoder);
    let result = link.call("vkInvalidateMappedMemoryRanges", params).unwrap();
    assert_eq!(result.ret, Value::Int(0));

    let encoder = link.encoder();
    assert_eq!(encoder.memory().read(memory, 0, 128), Some(vec![0x5A; 128]));
    assert_eq!(encoder.memory().read(memory, 128, 128), Some(vec![0; 128]));
}

#[test]
fn test_shader_code_words() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);

    let words = [0x0723_0203u64, 0x0001_0000, 0xDEAD_BEEF, 0x1234_5678];
    let mut info = encoder.codec().zeroed_struct("VkShaderModuleCreateInfo").unwrap();
    info.set("codeSize", Value::Int(16));
    info.set("pCode", Value::Array(words.iter().map(|w| Value::Int(*w)).collect()));

    let compound = reg.compound("VkShaderModuleCreateInfo").unwrap();
    let mut w = WireWriter::new();
    encoder
        .codec()
        .write_struct(&mut w, compound, &info, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap();
    let bytes = w.into_inner();
    // sType, pNext, flags, codeSize, then four words.
    assert_eq!(bytes.len(), 4 + 1 + 4 + 8 + 16);
    assert_eq!(&bytes[17..21], &0x0723_0203u32.to_be_bytes());
    let back = encoder
        .codec()
        .read_struct(&mut WireReader::new(&bytes), compound, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap();
    assert_eq!(back, info);

    let mut params = encoder.zeroed_params("vkCreateShaderModule").unwrap();
    set(&mut params, "device", Value::Handle(device));
    set(&mut params, "pCreateInfo", info.clone());
    let link = Loopback::new(encoder, decoder);
    let result = link.call("vkCreateShaderModule", params).unwrap();
    assert!(matches!(result.param("pShaderModule"), Some(Value::Handle(h)) if *h != 0));

    let decoder = link.decoder();
    let seen = decoder.driver().last("vkCreateShaderModule").unwrap();
    assert_eq!(param(seen, "pCreateInfo"), &Value::Struct(info));
}

#[test]
fn test_extension_chain_on_pipeline_state() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let codec = encoder.codec();
    let amd_type = s_type(&reg, "VK_STRUCTURE_TYPE_PIPELINE_RASTERIZATION_STATE_RASTERIZATION_ORDER_AMD");

    let amd = StructValue::new("VkPipelineRasterizationStateRasterizationOrderAMD")
        .with("sType", Value::Int(amd_type))
        .with("pNext", Value::Null)
        .with("rasterizationOrder", Value::Int(1));
    let mut raster = codec.zeroed_struct("VkPipelineRasterizationStateCreateInfo").unwrap();
    raster.set("pNext", amd.clone());

    let compound = reg.compound("VkPipelineRasterizationStateCreateInfo").unwrap();
    let mut w = WireWriter::new();
    codec
        .write_struct(&mut w, compound, &raster, STRUCTURE_TYPE_MAX_ENUM, HandleMapping::none())
        .unwrap();
    let bytes = w.into_inner();
    assert_eq!(bytes[4], 1);
    assert_eq!(&bytes[5..9], &(amd_type as u32).to_be_bytes());
    assert_eq!(&bytes[9..13], &(amd_type as u32).to_be_bytes());
    assert_eq!(bytes[13], 0);
    assert_eq!(&bytes[14..18], &1u32.to_be_bytes());

    let mut pipeline = codec.zeroed_struct("VkGraphicsPipelineCreateInfo").unwrap();
    pipeline.set("pRasterizationState", raster);
    let mut params = encoder.zeroed_params("vkCreateGraphicsPipelines").unwrap();
    set(&mut params, "device", Value::Handle(device));
    set(&mut params, "createInfoCount", Value::Int(1));
    set(&mut params, "pCreateInfos", Value::Array(vec![Value::Struct(pipeline)]));
    set(&mut params, "pPipelines", Value::Array(vec![Value::Handle(0)]));

    let link = Loopback::new(encoder, decoder);
    let result = link.call("vkCreateGraphicsPipelines", params).unwrap();
    let Some(Value::Array(pipelines)) = result.param("pPipelines") else {
        panic!("pPipelines is not an array");
    };
    assert_eq!(pipelines.len(), 1);

    let decoder = link.decoder();
    let seen = decoder.driver().last("vkCreateGraphicsPipelines").unwrap();
    let infos = param(seen, "pCreateInfos").structs();
    let raster = infos[0].get("pRasterizationState").and_then(Value::as_struct).unwrap();
    assert_eq!(raster.get("pNext"), Some(&Value::Struct(amd)));
}

#[test]
fn test_unknown_opcode_stops_decoding() {
    let reg = sample_registry().unwrap();
    let (encoder, mut decoder) = pair(&reg);
    let bogus = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 8];

    let mut out = Vec::new();
    assert_eq!(decoder.decode(&bogus, &mut out).unwrap(), 0);
    assert!(out.is_empty());
    assert!(decoder.driver().calls.is_empty());

    // A good packet ahead of it is still processed.
    let params = encoder.zeroed_params("vkEnumerateInstanceVersion").unwrap();
    let mut stream = encoder.encode("vkEnumerateInstanceVersion", &params).unwrap();
    let first = stream.len();
    stream.extend(bogus);
    assert_eq!(decoder.decode(&stream, &mut out).unwrap(), first);
    assert_eq!(decoder.driver().calls, vec!["vkEnumerateInstanceVersion".to_string()]);

    let link = Loopback::new(encoder, decoder);
    assert!(matches!(link.round_trip(&bogus), Err(WireError::UnknownOpcode(0xFFFF_FFFF))));
}

#[test]
fn test_partial_packet_waits_for_body() {
    let reg = sample_registry().unwrap();
    let (encoder, mut decoder) = pair(&reg);
    let params = create_instance_params(&encoder);
    let packet = encoder.encode("vkCreateInstance", &params).unwrap();

    let mut out = Vec::new();
    assert_eq!(decoder.decode(&packet[..20], &mut out).unwrap(), 0);
    assert_eq!(decoder.state(), DecoderState::ReadingBody);
    assert!(out.is_empty());

    assert_eq!(decoder.decode(&packet[..4], &mut out).unwrap(), 0);
    assert_eq!(decoder.state(), DecoderState::WaitingForHeader);

    assert_eq!(decoder.decode(&packet, &mut out).unwrap(), packet.len());
    assert_eq!(decoder.state(), DecoderState::WaitingForHeader);
    assert_eq!(decoder.driver().count("vkCreateInstance"), 1);
}

#[test]
fn test_undersized_length_stops_decoding() {
    let reg = sample_registry().unwrap();
    let (encoder, mut decoder) = pair(&reg);
    let opcode = encoder.opcodes().opcode("vkEnumerateInstanceVersion").unwrap();
    let mut w = WireWriter::new();
    PacketHeader { opcode, length: 4 }.write(&mut w);
    w.put_bytes(&[0; 8]);

    let mut out = Vec::new();
    assert_eq!(decoder.decode(w.as_slice(), &mut out).unwrap(), 0);
    assert!(decoder.driver().calls.is_empty());
}

fn create_buffer(link: &Loopback<'_, FakeDriver>, device: u64) -> CallResult {
    let mut params = link.encoder().zeroed_params("vkCreateBuffer").unwrap();
    set(&mut params, "device", Value::Handle(device));
    link.call("vkCreateBuffer", params).unwrap()
}

#[test]
fn test_bad_packet_after_good_one_reports_consumed_bytes() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let mut decoder = decoder;

    let mut params = encoder.zeroed_params("vkCreateBuffer").unwrap();
    set(&mut params, "device", Value::Handle(device));
    let mut stream = encoder.encode("vkCreateBuffer", &params).unwrap();
    let first = stream.len();

    // vkDestroyBuffer whose body stops three bytes into the device handle.
    let mut truncated = WireWriter::new();
    PacketHeader {
        opcode: encoder.opcodes().opcode("vkDestroyBuffer").unwrap(),
        length: (HEADER_SIZE + 3) as u32,
    }
    .write(&mut truncated);
    truncated.put_bytes(&[0, 0, 0]);
    stream.extend_from_slice(truncated.as_slice());

    let mut out = Vec::new();
    assert_eq!(decoder.decode(&stream, &mut out).unwrap(), first);
    assert_eq!(decoder.driver().calls, vec!["vkCreateBuffer".to_string()]);
    let responded = out.len();
    assert!(responded > 0);

    let err = decoder.decode(&stream[first..], &mut out).unwrap_err();
    assert!(matches!(err, WireError::ShortRead { .. }));
    assert_eq!(decoder.driver().count("vkCreateBuffer"), 1);
    assert_eq!(decoder.driver().count("vkDestroyBuffer"), 0);
    assert_eq!(out.len(), responded);
}

#[test]
fn test_double_destroy_reaches_driver_once() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let link = Loopback::new(encoder, decoder);

    let created = create_buffer(&link, device);
    let buffer = created.param("pBuffer").cloned().unwrap();

    for _ in 0..2 {
        let mut params = link.encoder().zeroed_params("vkDestroyBuffer").unwrap();
        set(&mut params, "device", Value::Handle(device));
        set(&mut params, "buffer", buffer.clone());
        link.call("vkDestroyBuffer", params).unwrap();
    }

    let decoder = link.decoder();
    assert_eq!(decoder.driver().count("vkCreateBuffer"), 1);
    assert_eq!(decoder.driver().count("vkDestroyBuffer"), 1);
    let seen = decoder.driver().last("vkDestroyBuffer").unwrap();
    assert_eq!(param(seen, "buffer"), &Value::Handle(FIRST_DRIVER_HANDLE));
    // Only the seeded device is left on either side.
    assert_eq!(decoder.handles().len(), 1);
    assert_eq!(link.encoder().handles().len(), 1);
}

#[test]
fn test_replayed_destroy_packet_is_skipped() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let buffer = seed_handle(&encoder, &decoder, 0xB0F);
    let mut decoder = decoder;

    let mut params = encoder.zeroed_params("vkDestroyBuffer").unwrap();
    set(&mut params, "device", Value::Handle(device));
    set(&mut params, "buffer", Value::Handle(buffer));
    let packet = encoder.encode("vkDestroyBuffer", &params).unwrap();

    let mut out = Vec::new();
    assert_eq!(decoder.decode(&packet, &mut out).unwrap(), packet.len());
    assert_eq!(decoder.decode(&packet, &mut out).unwrap(), packet.len());
    assert_eq!(decoder.driver().count("vkDestroyBuffer"), 1);
    assert!(out.is_empty());
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(String, Value)>>>);

impl SnapshotHook for Recorder {
    fn record(&mut self, api: &VulkanApi, _params: &[(String, Value)], ret: &Value) {
        self.0.lock().push((api.name.clone(), ret.clone()));
    }
}

#[test]
fn test_snapshot_sees_committed_calls() {
    let reg = sample_registry().unwrap();
    let recorder = Recorder::default();
    let encoder = Encoder::new(&reg);
    let decoder = Decoder::new(&reg, FakeDriver::new()).with_snapshot(Box::new(recorder.clone()));
    let device = seed_handle(&encoder, &decoder, DRIVER_DEVICE);
    let link = Loopback::new(encoder, decoder);

    create_buffer(&link, device);
    let mut params = link.encoder().zeroed_params("vkDestroyBuffer").unwrap();
    set(&mut params, "device", Value::Handle(device));
    link.call("vkDestroyBuffer", params).unwrap();

    let log = recorder.0.lock();
    assert_eq!(
        *log,
        vec![
            ("vkCreateBuffer".to_string(), Value::Int(0)),
            ("vkDestroyBuffer".to_string(), Value::Null),
        ]
    );
}

#[test]
fn test_enumerate_physical_devices_creates_each_handle() {
    let reg = sample_registry().unwrap();
    let (encoder, decoder) = pair(&reg);
    let instance = seed_handle(&encoder, &decoder, 0x1A5);
    let mut params = encoder.zeroed_params("vkEnumeratePhysicalDevices").unwrap();
    set(&mut params, "instance", Value::Handle(instance));
    set(&mut params, "pPhysicalDeviceCount", Value::Int(2));
    set(&mut params, "pPhysicalDevices", Value::Array(vec![Value::Handle(0), Value::Handle(0)]));

    let link = Loopback::new(encoder, decoder);
    let result = link.call("vkEnumeratePhysicalDevices", params).unwrap();
    let Some(Value::Array(devices)) = result.param("pPhysicalDevices") else {
        panic!("pPhysicalDevices is not an array");
    };
    let encoder = link.encoder();
    let decoder = link.decoder();
    let drivers: Vec<u64> = devices
        .iter()
        .map(|d| {
            let boxed = encoder.handles().unwrap(d.as_u64().unwrap()).unwrap();
            decoder.driver_handle(boxed).unwrap()
        })
        .collect();
    assert_eq!(drivers, vec![FIRST_DRIVER_HANDLE, FIRST_DRIVER_HANDLE + 1]);
}
