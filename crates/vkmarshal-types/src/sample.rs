//! Built-in registry covering a slice of core 1.0, core 1.1 and a handful of
//! extensions. Used by the CLI when no registry file is given and by the
//! test suites.

use ash::vk;

use crate::error::TypeError;
use crate::registry::{Feature, FeatureKind, TypeDef, TypeRegistry};
use crate::types::{DeviceMemoryRole, VulkanApi, VulkanCompoundType, VulkanType};

fn m(decl: &str) -> Result<VulkanType, TypeError> {
    VulkanType::from_decl(decl)
}

/// `sType` and a const `pNext`.
fn header() -> Result<Vec<VulkanType>, TypeError> {
    Ok(vec![m("VkStructureType sType")?, m("const void* pNext")?])
}

/// `sType` and a writable `pNext`, for structs the driver fills in.
fn out_header() -> Result<Vec<VulkanType>, TypeError> {
    Ok(vec![m("VkStructureType sType")?, m("void* pNext")?])
}

fn plain(reg: &mut TypeRegistry, name: &str, members: Vec<VulkanType>) {
    reg.add_compound(VulkanCompoundType::new(name, members));
}

fn structure(
    reg: &mut TypeRegistry,
    name: &str,
    literal: &str,
    s_type: vk::StructureType,
    extends: &[&str],
    members: Vec<VulkanType>,
) {
    reg.add_enum_value(literal, i64::from(s_type.as_raw()));
    let mut compound = VulkanCompoundType::new(name, members);
    compound.structure_type = Some(literal.to_string());
    compound.struct_extends = extends.iter().map(|s| s.to_string()).collect();
    reg.add_compound(compound);
}

fn command(reg: &mut TypeRegistry, name: &str, ret: &str, params: Vec<VulkanType>) {
    let mut api = VulkanApi::new(name, ret, params);
    api.transformed = !api.memory_roles().is_empty();
    reg.add_command(api);
}

fn types(reg: &mut TypeRegistry, defs: &[(&str, TypeDef)]) {
    for (name, def) in defs {
        reg.add_type(name, def.clone());
    }
}

fn enums(reg: &mut TypeRegistry, names: &[&str]) {
    for name in names {
        reg.add_type(name, TypeDef::Enum);
    }
}

fn bitmasks(reg: &mut TypeRegistry, names: &[&str]) {
    for name in names {
        reg.add_type(name, TypeDef::Bitmask { underlying: "VkFlags".into() });
    }
}

fn handles(reg: &mut TypeRegistry, names: &[&str]) {
    for name in names {
        reg.add_type(name, TypeDef::Handle);
    }
}

const PHYSICAL_DEVICE_FEATURES: &[&str] = &[
    "robustBufferAccess",
    "fullDrawIndexUint32",
    "imageCubeArray",
    "independentBlend",
    "geometryShader",
    "tessellationShader",
    "sampleRateShading",
    "dualSrcBlend",
    "logicOp",
    "multiDrawIndirect",
    "drawIndirectFirstInstance",
    "depthClamp",
    "depthBiasClamp",
    "fillModeNonSolid",
    "depthBounds",
    "wideLines",
    "largePoints",
    "alphaToOne",
    "multiViewport",
    "samplerAnisotropy",
    "textureCompressionETC2",
    "textureCompressionASTC_LDR",
    "textureCompressionBC",
    "occlusionQueryPrecise",
    "pipelineStatisticsQuery",
    "vertexPipelineStoresAndAtomics",
    "fragmentStoresAndAtomics",
    "shaderTessellationAndGeometryPointSize",
    "shaderImageGatherExtended",
    "shaderStorageImageExtendedFormats",
    "shaderStorageImageMultisample",
    "shaderStorageImageReadWithoutFormat",
    "shaderStorageImageWriteWithoutFormat",
    "shaderUniformBufferArrayDynamicIndexing",
    "shaderSampledImageArrayDynamicIndexing",
    "shaderStorageBufferArrayDynamicIndexing",
    "shaderStorageImageArrayDynamicIndexing",
    "shaderClipDistance",
    "shaderCullDistance",
    "shaderFloat64",
    "shaderInt64",
    "shaderInt16",
    "shaderResourceResidency",
    "shaderResourceMinLod",
    "sparseBinding",
    "sparseResidencyBuffer",
    "sparseResidencyImage2D",
    "sparseResidencyImage3D",
    "sparseResidency2Samples",
    "sparseResidency4Samples",
    "sparseResidency8Samples",
    "sparseResidency16Samples",
    "sparseResidencyAliased",
    "variableMultisampleRate",
    "inheritedQueries",
];

pub fn sample_registry() -> Result<TypeRegistry, TypeError> {
    let mut reg = TypeRegistry::new();

    reg.add_constant("VK_UUID_SIZE", vk::UUID_SIZE as u64);
    reg.add_constant("VK_MAX_EXTENSION_NAME_SIZE", vk::MAX_EXTENSION_NAME_SIZE as u64);
    reg.add_constant("VK_MAX_DESCRIPTION_SIZE", vk::MAX_DESCRIPTION_SIZE as u64);
    reg.add_constant("VK_MAX_MEMORY_TYPES", vk::MAX_MEMORY_TYPES as u64);
    reg.add_constant("VK_MAX_MEMORY_HEAPS", vk::MAX_MEMORY_HEAPS as u64);
    reg.add_enum_value("VK_STRUCTURE_TYPE_MAX_ENUM", crate::STRUCTURE_TYPE_MAX_ENUM);
    reg.add_enum_value("VK_SUCCESS", i64::from(vk::Result::SUCCESS.as_raw()));
    reg.add_enum_value("VK_INCOMPLETE", i64::from(vk::Result::INCOMPLETE.as_raw()));

    core_1_0(&mut reg)?;
    core_1_1(&mut reg)?;
    extensions(&mut reg)?;

    reg.reindex();
    Ok(reg)
}

// ── VK_VERSION_1_0 ──────────────────────────────────────────────────────

fn core_1_0(reg: &mut TypeRegistry) -> Result<(), TypeError> {
    reg.begin_feature(Feature::version("VK_VERSION_1_0", 1, 0));

    types(
        reg,
        &[
            ("VkFlags", TypeDef::Basetype { underlying: "uint32_t".into() }),
            ("VkBool32", TypeDef::Basetype { underlying: "uint32_t".into() }),
            ("VkDeviceSize", TypeDef::Basetype { underlying: "uint64_t".into() }),
            ("VkSampleMask", TypeDef::Basetype { underlying: "uint32_t".into() }),
            ("PFN_vkAllocationFunction", TypeDef::FuncPointer),
            ("PFN_vkReallocationFunction", TypeDef::FuncPointer),
            ("PFN_vkFreeFunction", TypeDef::FuncPointer),
            ("PFN_vkInternalAllocationNotification", TypeDef::FuncPointer),
            ("PFN_vkInternalFreeNotification", TypeDef::FuncPointer),
        ],
    );
    enums(
        reg,
        &[
            "VkStructureType",
            "VkResult",
            "VkFormat",
            "VkSharingMode",
            "VkPrimitiveTopology",
            "VkPolygonMode",
            "VkFrontFace",
            "VkCompareOp",
            "VkStencilOp",
            "VkLogicOp",
            "VkBlendFactor",
            "VkBlendOp",
            "VkDynamicState",
            "VkVertexInputRate",
            "VkShaderStageFlagBits",
            "VkSampleCountFlagBits",
        ],
    );
    bitmasks(
        reg,
        &[
            "VkInstanceCreateFlags",
            "VkDeviceCreateFlags",
            "VkDeviceQueueCreateFlags",
            "VkMemoryPropertyFlags",
            "VkMemoryHeapFlags",
            "VkMemoryMapFlags",
            "VkBufferCreateFlags",
            "VkBufferUsageFlags",
            "VkShaderModuleCreateFlags",
            "VkPipelineCreateFlags",
            "VkPipelineShaderStageCreateFlags",
            "VkPipelineVertexInputStateCreateFlags",
            "VkPipelineInputAssemblyStateCreateFlags",
            "VkPipelineTessellationStateCreateFlags",
            "VkPipelineViewportStateCreateFlags",
            "VkPipelineRasterizationStateCreateFlags",
            "VkPipelineMultisampleStateCreateFlags",
            "VkPipelineDepthStencilStateCreateFlags",
            "VkPipelineColorBlendStateCreateFlags",
            "VkPipelineDynamicStateCreateFlags",
            "VkCullModeFlags",
            "VkColorComponentFlags",
            "VkImageUsageFlags",
        ],
    );
    handles(
        reg,
        &[
            "VkInstance",
            "VkPhysicalDevice",
            "VkDevice",
            "VkQueue",
            "VkDeviceMemory",
            "VkBuffer",
            "VkImage",
            "VkShaderModule",
            "VkPipelineCache",
            "VkPipelineLayout",
            "VkRenderPass",
            "VkPipeline",
        ],
    );

    plain(
        reg,
        "VkAllocationCallbacks",
        vec![
            m("void* pUserData")?.optional(),
            m("PFN_vkAllocationFunction pfnAllocation")?,
            m("PFN_vkReallocationFunction pfnReallocation")?,
            m("PFN_vkFreeFunction pfnFree")?,
            m("PFN_vkInternalAllocationNotification pfnInternalAllocation")?.optional(),
            m("PFN_vkInternalFreeNotification pfnInternalFree")?.optional(),
        ],
    );

    let mut members = header()?;
    members.extend([
        m("const char* pApplicationName")?.with_len("null-terminated").optional(),
        m("uint32_t applicationVersion")?,
        m("const char* pEngineName")?.with_len("null-terminated").optional(),
        m("uint32_t engineVersion")?,
        m("uint32_t apiVersion")?,
    ]);
    structure(
        reg,
        "VkApplicationInfo",
        "VK_STRUCTURE_TYPE_APPLICATION_INFO",
        vk::StructureType::APPLICATION_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkInstanceCreateFlags flags")?.optional(),
        m("const VkApplicationInfo* pApplicationInfo")?.optional(),
        m("uint32_t enabledLayerCount")?.optional(),
        m("const char* const* ppEnabledLayerNames")?
            .with_len("enabledLayerCount,null-terminated"),
        m("uint32_t enabledExtensionCount")?.optional(),
        m("const char* const* ppEnabledExtensionNames")?
            .with_len("enabledExtensionCount,null-terminated"),
    ]);
    structure(
        reg,
        "VkInstanceCreateInfo",
        "VK_STRUCTURE_TYPE_INSTANCE_CREATE_INFO",
        vk::StructureType::INSTANCE_CREATE_INFO,
        &[],
        members,
    );

    plain(
        reg,
        "VkExtensionProperties",
        vec![
            m("char extensionName[VK_MAX_EXTENSION_NAME_SIZE]")?,
            m("uint32_t specVersion")?,
        ],
    );

    plain(
        reg,
        "VkPhysicalDeviceFeatures",
        PHYSICAL_DEVICE_FEATURES
            .iter()
            .map(|name| VulkanType::new("VkBool32", *name))
            .collect(),
    );

    plain(
        reg,
        "VkMemoryType",
        vec![m("VkMemoryPropertyFlags propertyFlags")?.optional(), m("uint32_t heapIndex")?],
    );
    plain(
        reg,
        "VkMemoryHeap",
        vec![m("VkDeviceSize size")?, m("VkMemoryHeapFlags flags")?.optional()],
    );
    plain(
        reg,
        "VkPhysicalDeviceMemoryProperties",
        vec![
            m("uint32_t memoryTypeCount")?,
            m("VkMemoryType memoryTypes[VK_MAX_MEMORY_TYPES]")?,
            m("uint32_t memoryHeapCount")?,
            m("VkMemoryHeap memoryHeaps[VK_MAX_MEMORY_HEAPS]")?,
        ],
    );

    let mut members = header()?;
    members.extend([
        m("VkDeviceQueueCreateFlags flags")?.optional(),
        m("uint32_t queueFamilyIndex")?,
        m("uint32_t queueCount")?,
        m("const float* pQueuePriorities")?.with_len("queueCount"),
    ]);
    structure(
        reg,
        "VkDeviceQueueCreateInfo",
        "VK_STRUCTURE_TYPE_DEVICE_QUEUE_CREATE_INFO",
        vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkDeviceCreateFlags flags")?.optional(),
        m("uint32_t queueCreateInfoCount")?,
        m("const VkDeviceQueueCreateInfo* pQueueCreateInfos")?.with_len("queueCreateInfoCount"),
        m("uint32_t enabledLayerCount")?.optional(),
        m("const char* const* ppEnabledLayerNames")?
            .with_len("enabledLayerCount,null-terminated"),
        m("uint32_t enabledExtensionCount")?.optional(),
        m("const char* const* ppEnabledExtensionNames")?
            .with_len("enabledExtensionCount,null-terminated"),
        m("const VkPhysicalDeviceFeatures* pEnabledFeatures")?.optional(),
    ]);
    structure(
        reg,
        "VkDeviceCreateInfo",
        "VK_STRUCTURE_TYPE_DEVICE_CREATE_INFO",
        vk::StructureType::DEVICE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkDeviceSize allocationSize")?.with_role(DeviceMemoryRole::Size),
        m("uint32_t memoryTypeIndex")?.with_role(DeviceMemoryRole::TypeIndex),
    ]);
    structure(
        reg,
        "VkMemoryAllocateInfo",
        "VK_STRUCTURE_TYPE_MEMORY_ALLOCATE_INFO",
        vk::StructureType::MEMORY_ALLOCATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkDeviceMemory memory")?.with_role(DeviceMemoryRole::Handle),
        m("VkDeviceSize offset")?.with_role(DeviceMemoryRole::Offset),
        m("VkDeviceSize size")?.with_role(DeviceMemoryRole::Size),
    ]);
    structure(
        reg,
        "VkMappedMemoryRange",
        "VK_STRUCTURE_TYPE_MAPPED_MEMORY_RANGE",
        vk::StructureType::MAPPED_MEMORY_RANGE,
        &[],
        members,
    );

    plain(
        reg,
        "VkMemoryRequirements",
        vec![
            m("VkDeviceSize size")?.with_role(DeviceMemoryRole::Size),
            m("VkDeviceSize alignment")?,
            m("uint32_t memoryTypeBits")?.with_role(DeviceMemoryRole::TypeBits),
        ],
    );

    let mut members = header()?;
    members.extend([
        m("VkBufferCreateFlags flags")?.optional(),
        m("VkDeviceSize size")?,
        m("VkBufferUsageFlags usage")?,
        m("VkSharingMode sharingMode")?,
        m("uint32_t queueFamilyIndexCount")?.optional(),
        m("const uint32_t* pQueueFamilyIndices")?
            .with_len("queueFamilyIndexCount")
            .optional(),
    ]);
    structure(
        reg,
        "VkBufferCreateInfo",
        "VK_STRUCTURE_TYPE_BUFFER_CREATE_INFO",
        vk::StructureType::BUFFER_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkShaderModuleCreateFlags flags")?.optional(),
        m("size_t codeSize")?,
        m("const uint32_t* pCode")?.with_len("codeSize / 4"),
    ]);
    structure(
        reg,
        "VkShaderModuleCreateInfo",
        "VK_STRUCTURE_TYPE_SHADER_MODULE_CREATE_INFO",
        vk::StructureType::SHADER_MODULE_CREATE_INFO,
        &[],
        members,
    );

    pipeline_types(reg)?;

    // Commands.
    command(
        reg,
        "vkCreateInstance",
        "VkResult",
        vec![
            m("const VkInstanceCreateInfo* pCreateInfo")?,
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkInstance* pInstance")?,
        ],
    );
    command(
        reg,
        "vkDestroyInstance",
        "void",
        vec![
            m("VkInstance instance")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );
    command(
        reg,
        "vkEnumeratePhysicalDevices",
        "VkResult",
        vec![
            m("VkInstance instance")?,
            m("uint32_t* pPhysicalDeviceCount")?,
            m("VkPhysicalDevice* pPhysicalDevices")?
                .with_len("pPhysicalDeviceCount")
                .optional(),
        ],
    );
    command(
        reg,
        "vkGetPhysicalDeviceMemoryProperties",
        "void",
        vec![
            m("VkPhysicalDevice physicalDevice")?,
            m("VkPhysicalDeviceMemoryProperties* pMemoryProperties")?,
        ],
    );
    command(
        reg,
        "vkEnumerateInstanceExtensionProperties",
        "VkResult",
        vec![
            m("const char* pLayerName")?.with_len("null-terminated").optional(),
            m("uint32_t* pPropertyCount")?,
            m("VkExtensionProperties* pProperties")?
                .with_len("pPropertyCount")
                .optional(),
        ],
    );
    command(
        reg,
        "vkCreateDevice",
        "VkResult",
        vec![
            m("VkPhysicalDevice physicalDevice")?,
            m("const VkDeviceCreateInfo* pCreateInfo")?,
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkDevice* pDevice")?,
        ],
    );
    command(
        reg,
        "vkDestroyDevice",
        "void",
        vec![
            m("VkDevice device")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );
    command(
        reg,
        "vkGetDeviceQueue",
        "void",
        vec![
            m("VkDevice device")?,
            m("uint32_t queueFamilyIndex")?,
            m("uint32_t queueIndex")?,
            m("VkQueue* pQueue")?,
        ],
    );
    command(
        reg,
        "vkAllocateMemory",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("const VkMemoryAllocateInfo* pAllocateInfo")?,
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkDeviceMemory* pMemory")?,
        ],
    );
    command(
        reg,
        "vkFreeMemory",
        "void",
        vec![
            m("VkDevice device")?,
            m("VkDeviceMemory memory")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );
    command(
        reg,
        "vkFlushMappedMemoryRanges",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("uint32_t memoryRangeCount")?,
            m("const VkMappedMemoryRange* pMemoryRanges")?.with_len("memoryRangeCount"),
        ],
    );
    command(
        reg,
        "vkInvalidateMappedMemoryRanges",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("uint32_t memoryRangeCount")?,
            m("const VkMappedMemoryRange* pMemoryRanges")?.with_len("memoryRangeCount"),
        ],
    );
    command(
        reg,
        "vkBindBufferMemory",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("VkBuffer buffer")?,
            m("VkDeviceMemory memory")?.with_role(DeviceMemoryRole::Handle),
            m("VkDeviceSize memoryOffset")?.with_role(DeviceMemoryRole::Offset),
        ],
    );
    command(
        reg,
        "vkGetBufferMemoryRequirements",
        "void",
        vec![
            m("VkDevice device")?,
            m("VkBuffer buffer")?,
            m("VkMemoryRequirements* pMemoryRequirements")?,
        ],
    );
    command(
        reg,
        "vkCreateBuffer",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("const VkBufferCreateInfo* pCreateInfo")?,
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkBuffer* pBuffer")?,
        ],
    );
    command(
        reg,
        "vkDestroyBuffer",
        "void",
        vec![
            m("VkDevice device")?,
            m("VkBuffer buffer")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );
    command(
        reg,
        "vkCreateShaderModule",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("const VkShaderModuleCreateInfo* pCreateInfo")?,
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkShaderModule* pShaderModule")?,
        ],
    );
    command(
        reg,
        "vkDestroyShaderModule",
        "void",
        vec![
            m("VkDevice device")?,
            m("VkShaderModule shaderModule")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );
    command(
        reg,
        "vkCreateGraphicsPipelines",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("VkPipelineCache pipelineCache")?.optional(),
            m("uint32_t createInfoCount")?,
            m("const VkGraphicsPipelineCreateInfo* pCreateInfos")?.with_len("createInfoCount"),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkPipeline* pPipelines")?.with_len("createInfoCount"),
        ],
    );
    command(
        reg,
        "vkDestroyPipeline",
        "void",
        vec![
            m("VkDevice device")?,
            m("VkPipeline pipeline")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );
    Ok(())
}

fn pipeline_types(reg: &mut TypeRegistry) -> Result<(), TypeError> {
    plain(
        reg,
        "VkSpecializationMapEntry",
        vec![m("uint32_t constantID")?, m("uint32_t offset")?, m("size_t size")?],
    );
    plain(
        reg,
        "VkSpecializationInfo",
        vec![
            m("uint32_t mapEntryCount")?.optional(),
            m("const VkSpecializationMapEntry* pMapEntries")?.with_len("mapEntryCount"),
            m("size_t dataSize")?.optional(),
            m("const void* pData")?.with_len("dataSize"),
        ],
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineShaderStageCreateFlags flags")?.optional(),
        m("VkShaderStageFlagBits stage")?,
        m("VkShaderModule module")?.optional(),
        m("const char* pName")?.with_len("null-terminated"),
        m("const VkSpecializationInfo* pSpecializationInfo")?.optional(),
    ]);
    structure(
        reg,
        "VkPipelineShaderStageCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_SHADER_STAGE_CREATE_INFO",
        vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
        &[],
        members,
    );

    plain(
        reg,
        "VkVertexInputBindingDescription",
        vec![
            m("uint32_t binding")?,
            m("uint32_t stride")?,
            m("VkVertexInputRate inputRate")?,
        ],
    );
    plain(
        reg,
        "VkVertexInputAttributeDescription",
        vec![
            m("uint32_t location")?,
            m("uint32_t binding")?,
            m("VkFormat format")?,
            m("uint32_t offset")?,
        ],
    );
    let mut members = header()?;
    members.extend([
        m("VkPipelineVertexInputStateCreateFlags flags")?.optional(),
        m("uint32_t vertexBindingDescriptionCount")?.optional(),
        m("const VkVertexInputBindingDescription* pVertexBindingDescriptions")?
            .with_len("vertexBindingDescriptionCount"),
        m("uint32_t vertexAttributeDescriptionCount")?.optional(),
        m("const VkVertexInputAttributeDescription* pVertexAttributeDescriptions")?
            .with_len("vertexAttributeDescriptionCount"),
    ]);
    structure(
        reg,
        "VkPipelineVertexInputStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineInputAssemblyStateCreateFlags flags")?.optional(),
        m("VkPrimitiveTopology topology")?,
        m("VkBool32 primitiveRestartEnable")?,
    ]);
    structure(
        reg,
        "VkPipelineInputAssemblyStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineTessellationStateCreateFlags flags")?.optional(),
        m("uint32_t patchControlPoints")?,
    ]);
    structure(
        reg,
        "VkPipelineTessellationStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_TESSELLATION_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_TESSELLATION_STATE_CREATE_INFO,
        &[],
        members,
    );

    plain(
        reg,
        "VkViewport",
        vec![
            m("float x")?,
            m("float y")?,
            m("float width")?,
            m("float height")?,
            m("float minDepth")?,
            m("float maxDepth")?,
        ],
    );
    plain(reg, "VkOffset2D", vec![m("int32_t x")?, m("int32_t y")?]);
    plain(reg, "VkExtent2D", vec![m("uint32_t width")?, m("uint32_t height")?]);
    plain(reg, "VkRect2D", vec![m("VkOffset2D offset")?, m("VkExtent2D extent")?]);
    let mut members = header()?;
    members.extend([
        m("VkPipelineViewportStateCreateFlags flags")?.optional(),
        m("uint32_t viewportCount")?.optional(),
        m("const VkViewport* pViewports")?
            .with_len("viewportCount")
            .optional(),
        m("uint32_t scissorCount")?.optional(),
        m("const VkRect2D* pScissors")?.with_len("scissorCount").optional(),
    ]);
    structure(
        reg,
        "VkPipelineViewportStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_VIEWPORT_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineRasterizationStateCreateFlags flags")?.optional(),
        m("VkBool32 depthClampEnable")?,
        m("VkBool32 rasterizerDiscardEnable")?,
        m("VkPolygonMode polygonMode")?,
        m("VkCullModeFlags cullMode")?.optional(),
        m("VkFrontFace frontFace")?,
        m("VkBool32 depthBiasEnable")?,
        m("float depthBiasConstantFactor")?,
        m("float depthBiasClamp")?,
        m("float depthBiasSlopeFactor")?,
        m("float lineWidth")?,
    ]);
    structure(
        reg,
        "VkPipelineRasterizationStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_RASTERIZATION_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineMultisampleStateCreateFlags flags")?.optional(),
        m("VkSampleCountFlagBits rasterizationSamples")?,
        m("VkBool32 sampleShadingEnable")?,
        m("float minSampleShading")?,
        m("const VkSampleMask* pSampleMask")?
            .with_len("latexmath:[\\lceil{\\mathit{rasterizationSamples} \\over 32}\\rceil]")
            .optional(),
        m("VkBool32 alphaToCoverageEnable")?,
        m("VkBool32 alphaToOneEnable")?,
    ]);
    structure(
        reg,
        "VkPipelineMultisampleStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_MULTISAMPLE_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        &[],
        members,
    );

    plain(
        reg,
        "VkStencilOpState",
        vec![
            m("VkStencilOp failOp")?,
            m("VkStencilOp passOp")?,
            m("VkStencilOp depthFailOp")?,
            m("VkCompareOp compareOp")?,
            m("uint32_t compareMask")?,
            m("uint32_t writeMask")?,
            m("uint32_t reference")?,
        ],
    );
    let mut members = header()?;
    members.extend([
        m("VkPipelineDepthStencilStateCreateFlags flags")?.optional(),
        m("VkBool32 depthTestEnable")?,
        m("VkBool32 depthWriteEnable")?,
        m("VkCompareOp depthCompareOp")?,
        m("VkBool32 depthBoundsTestEnable")?,
        m("VkBool32 stencilTestEnable")?,
        m("VkStencilOpState front")?,
        m("VkStencilOpState back")?,
        m("float minDepthBounds")?,
        m("float maxDepthBounds")?,
    ]);
    structure(
        reg,
        "VkPipelineDepthStencilStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        &[],
        members,
    );

    plain(
        reg,
        "VkPipelineColorBlendAttachmentState",
        vec![
            m("VkBool32 blendEnable")?,
            m("VkBlendFactor srcColorBlendFactor")?,
            m("VkBlendFactor dstColorBlendFactor")?,
            m("VkBlendOp colorBlendOp")?,
            m("VkBlendFactor srcAlphaBlendFactor")?,
            m("VkBlendFactor dstAlphaBlendFactor")?,
            m("VkBlendOp alphaBlendOp")?,
            m("VkColorComponentFlags colorWriteMask")?.optional(),
        ],
    );
    let mut members = header()?;
    members.extend([
        m("VkPipelineColorBlendStateCreateFlags flags")?.optional(),
        m("VkBool32 logicOpEnable")?,
        m("VkLogicOp logicOp")?,
        m("uint32_t attachmentCount")?.optional(),
        m("const VkPipelineColorBlendAttachmentState* pAttachments")?
            .with_len("attachmentCount"),
        m("float blendConstants[4]")?,
    ]);
    structure(
        reg,
        "VkPipelineColorBlendStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_COLOR_BLEND_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineDynamicStateCreateFlags flags")?.optional(),
        m("uint32_t dynamicStateCount")?.optional(),
        m("const VkDynamicState* pDynamicStates")?.with_len("dynamicStateCount"),
    ]);
    structure(
        reg,
        "VkPipelineDynamicStateCreateInfo",
        "VK_STRUCTURE_TYPE_PIPELINE_DYNAMIC_STATE_CREATE_INFO",
        vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        &[],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkPipelineCreateFlags flags")?.optional(),
        m("uint32_t stageCount")?.optional(),
        m("const VkPipelineShaderStageCreateInfo* pStages")?
            .with_len("stageCount")
            .optional(),
        m("const VkPipelineVertexInputStateCreateInfo* pVertexInputState")?.optional(),
        m("const VkPipelineInputAssemblyStateCreateInfo* pInputAssemblyState")?.optional(),
        m("const VkPipelineTessellationStateCreateInfo* pTessellationState")?.optional(),
        m("const VkPipelineViewportStateCreateInfo* pViewportState")?.optional(),
        m("const VkPipelineRasterizationStateCreateInfo* pRasterizationState")?.optional(),
        m("const VkPipelineMultisampleStateCreateInfo* pMultisampleState")?.optional(),
        m("const VkPipelineDepthStencilStateCreateInfo* pDepthStencilState")?.optional(),
        m("const VkPipelineColorBlendStateCreateInfo* pColorBlendState")?.optional(),
        m("const VkPipelineDynamicStateCreateInfo* pDynamicState")?.optional(),
        m("VkPipelineLayout layout")?.optional(),
        m("VkRenderPass renderPass")?.optional(),
        m("uint32_t subpass")?,
        m("VkPipeline basePipelineHandle")?.optional(),
        m("int32_t basePipelineIndex")?,
    ]);
    structure(
        reg,
        "VkGraphicsPipelineCreateInfo",
        "VK_STRUCTURE_TYPE_GRAPHICS_PIPELINE_CREATE_INFO",
        vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        &[],
        members,
    );
    Ok(())
}

// ── VK_VERSION_1_1 ──────────────────────────────────────────────────────

fn core_1_1(reg: &mut TypeRegistry) -> Result<(), TypeError> {
    reg.begin_feature(Feature::version("VK_VERSION_1_1", 1, 1));
    bitmasks(reg, &["VkExternalMemoryHandleTypeFlags"]);

    let mut members = out_header()?;
    members.push(m("VkPhysicalDeviceFeatures features")?);
    structure(
        reg,
        "VkPhysicalDeviceFeatures2",
        "VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FEATURES_2",
        vk::StructureType::PHYSICAL_DEVICE_FEATURES_2,
        &["VkDeviceCreateInfo"],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkImage image")?.optional(),
        m("VkBuffer buffer")?.optional(),
    ]);
    structure(
        reg,
        "VkMemoryDedicatedAllocateInfo",
        "VK_STRUCTURE_TYPE_MEMORY_DEDICATED_ALLOCATE_INFO",
        vk::StructureType::MEMORY_DEDICATED_ALLOCATE_INFO,
        &["VkMemoryAllocateInfo"],
        members,
    );

    let mut members = header()?;
    members.push(m("VkExternalMemoryHandleTypeFlags handleTypes")?.optional());
    structure(
        reg,
        "VkExportMemoryAllocateInfo",
        "VK_STRUCTURE_TYPE_EXPORT_MEMORY_ALLOCATE_INFO",
        vk::StructureType::EXPORT_MEMORY_ALLOCATE_INFO,
        &["VkMemoryAllocateInfo"],
        members,
    );

    let mut members = header()?;
    members.push(m("VkExternalMemoryHandleTypeFlags handleTypes")?.optional());
    structure(
        reg,
        "VkExternalMemoryBufferCreateInfo",
        "VK_STRUCTURE_TYPE_EXTERNAL_MEMORY_BUFFER_CREATE_INFO",
        vk::StructureType::EXTERNAL_MEMORY_BUFFER_CREATE_INFO,
        &["VkBufferCreateInfo"],
        members,
    );

    let mut members = header()?;
    members.extend([
        m("VkBuffer buffer")?,
        m("VkDeviceMemory memory")?.with_role(DeviceMemoryRole::Handle),
        m("VkDeviceSize memoryOffset")?.with_role(DeviceMemoryRole::Offset),
    ]);
    structure(
        reg,
        "VkBindBufferMemoryInfo",
        "VK_STRUCTURE_TYPE_BIND_BUFFER_MEMORY_INFO",
        vk::StructureType::BIND_BUFFER_MEMORY_INFO,
        &[],
        members,
    );

    command(
        reg,
        "vkEnumerateInstanceVersion",
        "VkResult",
        vec![m("uint32_t* pApiVersion")?],
    );
    command(
        reg,
        "vkGetPhysicalDeviceFeatures2",
        "void",
        vec![
            m("VkPhysicalDevice physicalDevice")?,
            m("VkPhysicalDeviceFeatures2* pFeatures")?,
        ],
    );
    command(
        reg,
        "vkBindBufferMemory2",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("uint32_t bindInfoCount")?,
            m("const VkBindBufferMemoryInfo* pBindInfos")?.with_len("bindInfoCount"),
        ],
    );
    Ok(())
}

// ── Extensions ──────────────────────────────────────────────────────────

fn extensions(reg: &mut TypeRegistry) -> Result<(), TypeError> {
    reg.begin_feature(Feature::with_kind("VK_KHR_surface", FeatureKind::InstanceExtension));
    handles(reg, &["VkSurfaceKHR"]);
    enums(
        reg,
        &[
            "VkColorSpaceKHR",
            "VkPresentModeKHR",
            "VkSurfaceTransformFlagBitsKHR",
            "VkCompositeAlphaFlagBitsKHR",
        ],
    );
    command(
        reg,
        "vkDestroySurfaceKHR",
        "void",
        vec![
            m("VkInstance instance")?,
            m("VkSurfaceKHR surface")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );

    reg.begin_feature(Feature::with_kind("VK_KHR_swapchain", FeatureKind::DeviceExtension));
    handles(reg, &["VkSwapchainKHR"]);
    bitmasks(reg, &["VkSwapchainCreateFlagsKHR"]);
    let mut members = header()?;
    members.extend([
        m("VkSwapchainCreateFlagsKHR flags")?.optional(),
        m("VkSurfaceKHR surface")?,
        m("uint32_t minImageCount")?,
        m("VkFormat imageFormat")?,
        m("VkColorSpaceKHR imageColorSpace")?,
        m("VkExtent2D imageExtent")?,
        m("uint32_t imageArrayLayers")?,
        m("VkImageUsageFlags imageUsage")?,
        m("VkSharingMode imageSharingMode")?,
        m("uint32_t queueFamilyIndexCount")?.optional(),
        m("const uint32_t* pQueueFamilyIndices")?
            .with_len("queueFamilyIndexCount")
            .optional(),
        m("VkSurfaceTransformFlagBitsKHR preTransform")?,
        m("VkCompositeAlphaFlagBitsKHR compositeAlpha")?,
        m("VkPresentModeKHR presentMode")?,
        m("VkBool32 clipped")?,
        m("VkSwapchainKHR oldSwapchain")?.optional(),
    ]);
    structure(
        reg,
        "VkSwapchainCreateInfoKHR",
        "VK_STRUCTURE_TYPE_SWAPCHAIN_CREATE_INFO_KHR",
        vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
        &[],
        members,
    );
    command(
        reg,
        "vkCreateSwapchainKHR",
        "VkResult",
        vec![
            m("VkDevice device")?,
            m("const VkSwapchainCreateInfoKHR* pCreateInfo")?,
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
            m("VkSwapchainKHR* pSwapchain")?,
        ],
    );
    command(
        reg,
        "vkDestroySwapchainKHR",
        "void",
        vec![
            m("VkDevice device")?,
            m("VkSwapchainKHR swapchain")?.optional(),
            m("const VkAllocationCallbacks* pAllocator")?.optional(),
        ],
    );

    reg.begin_feature(Feature::with_kind(
        "VK_AMD_rasterization_order",
        FeatureKind::DeviceExtension,
    ));
    enums(reg, &["VkRasterizationOrderAMD"]);
    let mut members = header()?;
    members.push(m("VkRasterizationOrderAMD rasterizationOrder")?);
    structure(
        reg,
        "VkPipelineRasterizationStateRasterizationOrderAMD",
        "VK_STRUCTURE_TYPE_PIPELINE_RASTERIZATION_STATE_RASTERIZATION_ORDER_AMD",
        vk::StructureType::PIPELINE_RASTERIZATION_STATE_RASTERIZATION_ORDER_AMD,
        &["VkPipelineRasterizationStateCreateInfo"],
        members,
    );

    reg.begin_feature(Feature::with_kind("VK_KHR_bind_memory2", FeatureKind::DeviceExtension));
    reg.add_alias("VkBindBufferMemoryInfoKHR", "VkBindBufferMemoryInfo");
    reg.add_alias("vkBindBufferMemory2KHR", "vkBindBufferMemory2");

    reg.begin_feature(Feature::with_kind(
        "VK_EXT_fragment_density_map",
        FeatureKind::DeviceExtension,
    ));
    let mut members = out_header()?;
    members.extend([
        m("VkBool32 fragmentDensityMap")?,
        m("VkBool32 fragmentDensityMapDynamic")?,
        m("VkBool32 fragmentDensityMapNonSubsampledImages")?,
    ]);
    structure(
        reg,
        "VkPhysicalDeviceFragmentDensityMapFeaturesEXT",
        "VK_STRUCTURE_TYPE_PHYSICAL_DEVICE_FRAGMENT_DENSITY_MAP_FEATURES_EXT",
        vk::StructureType::PHYSICAL_DEVICE_FRAGMENT_DENSITY_MAP_FEATURES_EXT,
        &["VkPhysicalDeviceFeatures2", "VkDeviceCreateInfo"],
        members,
    );

    reg.begin_feature(Feature::with_kind(
        "VK_KHR_acceleration_structure",
        FeatureKind::DeviceExtension,
    ));
    enums(reg, &["VkAccelerationStructureCompatibilityKHR"]);
    let mut members = header()?;
    members.push(
        m("const uint8_t* pVersionData")?
            .with_len("latexmath:[2 \\times \\mathtt{VK\\_UUID\\_SIZE}]"),
    );
    structure(
        reg,
        "VkAccelerationStructureVersionInfoKHR",
        "VK_STRUCTURE_TYPE_ACCELERATION_STRUCTURE_VERSION_INFO_KHR",
        vk::StructureType::ACCELERATION_STRUCTURE_VERSION_INFO_KHR,
        &[],
        members,
    );
    command(
        reg,
        "vkGetDeviceAccelerationStructureCompatibilityKHR",
        "void",
        vec![
            m("VkDevice device")?,
            m("const VkAccelerationStructureVersionInfoKHR* pVersionInfo")?,
            m("VkAccelerationStructureCompatibilityKHR* pCompatibility")?,
        ],
    );

    // The gfxstream import struct reuses the fragment density map sType on
    // VkMemoryAllocateInfo chains.
    reg.begin_feature(Feature::with_kind("VK_GOOGLE_gfxstream", FeatureKind::DeviceExtension));
    let mut members = header()?;
    members.push(m("uint32_t colorBuffer")?);
    structure(
        reg,
        "VkImportColorBufferGOOGLE",
        "VK_STRUCTURE_TYPE_IMPORT_COLOR_BUFFER_GOOGLE",
        vk::StructureType::PHYSICAL_DEVICE_FRAGMENT_DENSITY_MAP_FEATURES_EXT,
        &["VkMemoryAllocateInfo"],
        members,
    );
    Ok(())
}
