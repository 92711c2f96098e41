
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub(crate) const MANIFEST: &str = include_str!("../../tests/fixtures/AndroidManifest.xml");
pub(crate) const VM_RUNNER: &str = include_str!("../../tests/fixtures/VMRunner.smali");
pub(crate) const SIGNATURE_CHECK: &str = include_str!("../../tests/fixtures/SignatureCheck.smali");
pub(crate) const FILE_PATHS: &str = include_str!("../../tests/fixtures/file_paths.xml");

pub(crate) fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(&p, content).unwrap();
    p
}

/// Lays out a decoded package the way the decompiler does.
pub(crate) fn decompiled_tree(root: &Path, architectures: &[&str]) {
    write(root, "AndroidManifest.xml", MANIFEST);
    write(root, "smali/com/pairip/VMRunner.smali", VM_RUNNER);
    write(root, "smali_classes2/com/pairip/SignatureCheck.smali", SIGNATURE_CHECK);
    write(root, "smali/com/example/game/MainActivity.smali", ".class public Lcom/example/game/MainActivity;\n");
    write(root, "resources/package_1/res/xml/file_paths.xml", FILE_PATHS);
    write(root, "resources/package_1/res/values/strings.xml", "<resources/>\n");
    for arch in architectures {
        write(root, &format!("root/lib/{arch}/libpairipcore.so"), "core");
        write(root, &format!("root/lib/{arch}/libgame.so"), "game");
    }
}

pub(crate) fn write_bundle(path: &Path, entries: &[(&str, &str)]) {
    let mut w = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in entries {
        w.start_file(*name, zip::write::SimpleFileOptions::default()).unwrap();
        w.write_all(data.as_bytes()).unwrap();
    }
    w.finish().unwrap();
}
