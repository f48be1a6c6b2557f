use vkmarshal_common::text::generated_banner;
use vkmarshal_types::Feature;

use crate::emitter::CodeEmitter;

/// One emitted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub name: String,
    pub contents: String,
}

/// Header and implementation text of one C++ module.
#[derive(Debug, Clone)]
pub struct OutputSink {
    stem: String,
    pub header: CodeEmitter,
    pub imp: CodeEmitter,
}

impl OutputSink {
    pub fn new(stem: impl Into<String>) -> Self {
        let stem = stem.into();
        let mut header = CodeEmitter::new();
        header.raw(generated_banner("//", &format!("{stem}.h")));
        header.raw("#pragma once");
        header.blank();
        let mut imp = CodeEmitter::new();
        imp.raw(generated_banner("//", &format!("{stem}.cpp")));
        imp.raw(format!("#include \"{stem}.h\""));
        imp.blank();
        Self { stem, header, imp }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn include(&mut self, file: &str) {
        self.header.raw(format!("#include \"{file}\""));
    }

    pub fn include_system(&mut self, file: &str) {
        self.header.raw(format!("#include <{file}>"));
    }

    /// Open a namespace in both files.
    pub fn begin_namespace(&mut self, ns: &str) {
        for cgen in [&mut self.header, &mut self.imp] {
            cgen.blank();
            cgen.raw(format!("namespace {ns} {{"));
            cgen.blank();
        }
    }

    pub fn end_namespace(&mut self, ns: &str) {
        for cgen in [&mut self.header, &mut self.imp] {
            cgen.raw(format!("}}  // namespace {ns}"));
        }
    }

    pub fn begin_guard(&mut self, feature: &Feature) {
        for cgen in [&mut self.header, &mut self.imp] {
            cgen.raw(format!("#ifdef {}", feature.name));
        }
    }

    pub fn end_guard(&mut self, _feature: &Feature) {
        for cgen in [&mut self.header, &mut self.imp] {
            cgen.raw("#endif");
        }
    }

    pub fn into_files(self) -> Vec<GeneratedFile> {
        vec![
            GeneratedFile {
                name: format!("{}.h", self.stem),
                contents: self.header.into_string(),
            },
            GeneratedFile {
                name: format!("{}.cpp", self.stem),
                contents: self.imp.into_string(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_go_to_both_files() {
        let mut sink = OutputSink::new("goldfish_vk_deepcopy");
        let feature = Feature::version("VK_VERSION_1_1", 1, 1);
        sink.begin_guard(&feature);
        sink.end_guard(&feature);
        let files = sink.into_files();
        assert_eq!(files[0].name, "goldfish_vk_deepcopy.h");
        assert_eq!(files[1].name, "goldfish_vk_deepcopy.cpp");
        for file in &files {
            assert!(file.contents.contains("#ifdef VK_VERSION_1_1\n#endif\n"));
        }
        assert!(files[1].contents.contains("#include \"goldfish_vk_deepcopy.h\""));
    }
}
