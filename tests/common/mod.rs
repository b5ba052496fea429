//! Fixture bundles shared by the integration tests

#![allow(dead_code)]

use gamepack::installer::UNINSTALLER_NAME;
use gamepack::{DesktopEntryConfig, InstallationConfig};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

/// Write a zip archive holding `entries`; names ending in `/` become directories.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = zip::ZipWriter::new(File::create(path).expect("Should create archive"));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .expect("Should add directory");
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("Should start file");
            writer.write_all(data.as_bytes()).expect("Should write entry");
        }
    }
    writer.finish().expect("Should finish archive");
}

/// A bundle directory as shipped to users: two archives, an icon and the
/// companion uninstaller binary.
pub struct Bundle {
    pub dir: PathBuf,
    pub config: InstallationConfig,
    /// Entries across both archives
    pub total: u64,
}

pub fn bundle(scratch: &Path, install_root: PathBuf) -> Bundle {
    let dir = scratch.join("bundle");
    fs::create_dir_all(&dir).expect("Should create bundle dir");

    write_zip(
        &dir.join("game-1.zip"),
        &[
            ("bin/", ""),
            ("bin/Runner", "#!/bin/sh\necho run\n"),
            ("data/", ""),
            ("data/level1.pak", "level one"),
        ],
    );
    write_zip(
        &dir.join("game-2.zip"),
        &[
            ("data/level2.pak", "level two"),
            ("start.sh", "#!/bin/sh\n"),
            ("icon.png", "png"),
        ],
    );
    fs::write(dir.join(UNINSTALLER_NAME), b"#!/bin/sh\n").expect("Should write uninstaller");

    let config = InstallationConfig {
        install_path: install_root,
        game_assets: vec![PathBuf::from("game-1.zip"), PathBuf::from("game-2.zip")],
        exec_path: PathBuf::from("bin/Runner"),
        desktop_entry: DesktopEntryConfig {
            name: "Space Miner".to_string(),
            exec: "bin/Runner".to_string(),
            icon: "icon.png".to_string(),
            categories: "Game;".to_string(),
            entry_type: "Application".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    Bundle {
        dir,
        config,
        total: 7,
    }
}
