//! End-to-end pipeline runs over synthetic input directories.

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};

use nxpkg_cli::{pipeline, BuildSettings};

const TITLE_ID: u64 = 0x0100_0000_0000_2000;

fn write_npdm(exefs: &Path) {
    let mut npdm = vec![0u8; 0x700];
    npdm[..4].copy_from_slice(b"META");
    npdm[0x70..0x74].copy_from_slice(&0x80u32.to_le_bytes());
    npdm[0x78..0x7C].copy_from_slice(&0x300u32.to_le_bytes());
    npdm[0x80..0x84].copy_from_slice(b"ACI0");
    npdm[0x90..0x98].copy_from_slice(&TITLE_ID.to_le_bytes());
    npdm[0x500..0x504].copy_from_slice(b"ACID");
    fs::write(exefs.join("main.npdm"), npdm).unwrap();
}

fn write_nacp(control: &Path) {
    let mut nacp = vec![0u8; 0x4000];
    nacp[..4].copy_from_slice(b"Demo");
    nacp[0x200..0x209].copy_from_slice(b"Publisher");
    fs::write(control.join("control.nacp"), nacp).unwrap();
}

fn make_settings(root: &Path, with_htmldoc: bool) -> BuildSettings {
    let exefs = root.join("exefs");
    let romfs = root.join("romfs");
    let logo = root.join("logo");
    let control = root.join("control");
    fs::create_dir_all(&exefs).unwrap();
    fs::create_dir_all(&romfs).unwrap();
    fs::create_dir_all(&logo).unwrap();
    fs::create_dir_all(&control).unwrap();

    fs::write(exefs.join("main"), vec![0x7Fu8; 0x1000]).unwrap();
    write_npdm(&exefs);
    fs::write(romfs.join("asset.bin"), vec![0x3Du8; 0x2000]).unwrap();
    fs::write(logo.join("NintendoLogo.png"), vec![0x89u8; 0x100]).unwrap();
    write_nacp(&control);

    let keyset = root.join("prod.keys");
    fs::write(
        &keyset,
        "header_key = a0a1a2a3a4a5a6a7a8a9aaabacadaeaf\
         b0b1b2b3b4b5b6b7b8b9babbbcbdbebf\n\
         key_area_key_application_00 = 101112131415161718191a1b1c1d1e1f\n",
    )
    .unwrap();

    let htmldoc_dir = if with_htmldoc {
        let htmldoc = root.join("htmldoc");
        fs::create_dir_all(&htmldoc).unwrap();
        fs::write(htmldoc.join("index.html"), b"<html></html>").unwrap();
        Some(htmldoc)
    } else {
        None
    };

    BuildSettings {
        keyset_path: Some(keyset),
        temp_dir: root.join("temp"),
        nca_dir: root.join("nca"),
        nsp_dir: root.join("nsp"),
        backup_dir: root.join("backup"),
        exefs_dir: exefs,
        romfs_dir: romfs,
        logo_dir: logo,
        control_dir: control,
        htmldoc_dir,
        keep_nca_dir: true,
        // Signing salts are random; unsigned builds stay reproducible.
        no_sign_acid: true,
        ..BuildSettings::default()
    }
}

/// Entry names recorded in a package archive.
fn package_entries(nsp: &[u8]) -> Vec<String> {
    assert_eq!(&nsp[..4], b"PFS0");
    let count = LittleEndian::read_u32(&nsp[0x4..]) as usize;
    let name_table_ofs = 0x10 + count * 0x18;

    let mut names = Vec::new();
    for i in 0..count {
        let entry = &nsp[0x10 + i * 0x18..];
        let name_ofs = LittleEndian::read_u32(&entry[0x10..]) as usize;
        let name_bytes = &nsp[name_table_ofs + name_ofs..];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap();
        names.push(String::from_utf8(name_bytes[..end].to_vec()).unwrap());
    }
    names
}

#[test]
fn full_build_produces_three_containers() {
    let root = tempfile::tempdir().unwrap();
    let settings = make_settings(root.path(), false);

    let nsp_path = pipeline::run(&settings).unwrap();
    assert_eq!(
        nsp_path.file_name().unwrap().to_str().unwrap(),
        format!("{TITLE_ID:016x}.nsp")
    );

    let nsp = fs::read(&nsp_path).unwrap();
    let names = package_entries(&nsp);
    assert_eq!(names.len(), 3);
    assert_eq!(names.iter().filter(|n| n.ends_with(".cnmt.nca")).count(), 1);
    assert!(names
        .iter()
        .all(|n| n.ends_with(".nca") && n.len() == 36 || n.ends_with(".cnmt.nca")));

    // Containers named by content id survive in the kept directory.
    let kept: Vec<PathBuf> = fs::read_dir(&settings.nca_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(kept.len(), 3);
}

#[test]
fn manual_directory_adds_a_container() {
    let root = tempfile::tempdir().unwrap();
    let settings = make_settings(root.path(), true);

    let nsp_path = pipeline::run(&settings).unwrap();
    let nsp = fs::read(&nsp_path).unwrap();
    assert_eq!(package_entries(&nsp).len(), 4);
}

#[test]
fn reruns_are_byte_identical() {
    let root_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    let settings_a = make_settings(root_a.path(), false);
    let settings_b = make_settings(root_b.path(), false);

    let nsp_a = fs::read(pipeline::run(&settings_a).unwrap()).unwrap();
    let nsp_b = fs::read(pipeline::run(&settings_b).unwrap()).unwrap();
    assert_eq!(nsp_a, nsp_b);
}

#[test]
fn missing_keyset_aborts() {
    let root = tempfile::tempdir().unwrap();
    let mut settings = make_settings(root.path(), false);
    settings.keyset_path = Some(root.path().join("absent.keys"));

    assert!(pipeline::run(&settings).is_err());
}

#[test]
fn missing_exefs_aborts() {
    let root = tempfile::tempdir().unwrap();
    let mut settings = make_settings(root.path(), false);
    settings.exefs_dir = root.path().join("not-there");

    assert!(pipeline::run(&settings).is_err());
}
