//! Block device nodes from /sys/block and /proc/diskstats.

use super::{read_text, CounterRate};
use crate::fixed::SensorCell;
use crate::hardware::{Hardware, HardwareKind, SensorHandle, SensorKind};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// /proc/diskstats counts 512-byte sectors regardless of the device's block size.
const SECTOR_SIZE: u64 = 512;

/// Pseudo block devices with no physical backing.
const SKIPPED_PREFIXES: &[&str] = &["loop", "ram", "zram"];

/// Sectors read and written for `device`.
///
/// Fields: major minor name reads_completed reads_merged sectors_read
/// time_reading writes_completed writes_merged sectors_written ...
pub fn parse_diskstats(content: &str, device: &str) -> Option<(u64, u64)> {
    content.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 10 && parts[2] == device {
            Some((parts[5].parse().ok()?, parts[9].parse().ok()?))
        } else {
            None
        }
    })
}

/// Returns the device mounted at `/`, e.g. "/dev/nvme0n1p2".
pub fn parse_root_device(mounts: &str) -> Option<String> {
    mounts.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let device = parts.next()?;
        let mountpoint = parts.next()?;
        (mountpoint == "/" && device.starts_with("/dev/")).then(|| device.to_string())
    })
}

/// Whole-disk name backing the root filesystem, e.g. "nvme0n1".
pub fn root_disk() -> Option<String> {
    root_disk_in(Path::new("/"))
}

/// [`root_disk`] resolved under `root`.
pub fn root_disk_in(root: &Path) -> Option<String> {
    let mounts = read_text(&root.join("proc/mounts"))?;
    let device = parse_root_device(&mounts)?;
    let name = device.rsplit('/').next()?.to_string();

    // A partition's sysfs entry sits inside its parent disk's directory.
    let entry = root.join("sys/class/block").join(&name);
    if entry.join("partition").exists() {
        let resolved = fs::canonicalize(&entry).ok()?;
        let parent = resolved.parent()?.file_name()?;
        return Some(parent.to_string_lossy().to_string());
    }
    Some(name)
}

struct Rates {
    read: CounterRate,
    write: CounterRate,
}

/// One whole block device.
pub struct DiskNode {
    name: String,
    diskstats: PathBuf,
    read: Arc<SensorCell>,
    write: Arc<SensorCell>,
    rates: Mutex<Rates>,
}

impl DiskNode {
    fn new(name: String, diskstats: PathBuf) -> Self {
        Self {
            name,
            diskstats,
            read: SensorCell::new(SensorKind::Throughput, "Read Rate"),
            write: SensorCell::new(SensorKind::Throughput, "Write Rate"),
            rates: Mutex::new(Rates {
                read: CounterRate::new(),
                write: CounterRate::new(),
            }),
        }
    }
}

/// Lists whole disks under /sys/block, sorted by name.
pub fn discover(root: &Path) -> Vec<DiskNode> {
    let Ok(entries) = fs::read_dir(root.join("sys/block")) else {
        return Vec::new();
    };
    let diskstats = root.join("proc/diskstats");

    let mut disks: Vec<DiskNode> = entries
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !SKIPPED_PREFIXES.iter().any(|p| name.starts_with(p)))
        .map(|name| DiskNode::new(name, diskstats.clone()))
        .collect();
    disks.sort_by(|a, b| a.name.cmp(&b.name));
    disks
}

impl Hardware for DiskNode {
    fn kind(&self) -> HardwareKind {
        HardwareKind::Storage
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn sensors(&self) -> Vec<SensorHandle> {
        vec![
            self.read.clone() as SensorHandle,
            self.write.clone() as SensorHandle,
        ]
    }

    fn refresh(&self) {
        let now = Instant::now();
        let mut rates = self.rates.lock().unwrap_or_else(|e| e.into_inner());

        let sectors = fs::read_to_string(&self.diskstats)
            .ok()
            .and_then(|content| parse_diskstats(&content, &self.name));
        match sectors {
            Some((read, write)) => {
                let read_rate = rates.read.update(read * SECTOR_SIZE, now);
                let write_rate = rates.write.update(write * SECTOR_SIZE, now);
                self.read.set(read_rate.map(|r| r as f32));
                self.write.set(write_rate.map(|r| r as f32));
            }
            None => {
                rates.read.reset();
                rates.write.reset();
                self.read.set(None);
                self.write.set(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
 259       0 nvme0n1 48213 1203 3145728 9000 30211 8123 2097152 12000 0 15000 21000
 259       1 nvme0n1p1 120 0 4096 10 2 0 16 0 0 10 10
   8       0 sda 10 0 100 5 20 0 200 7 0 12 12
";

    #[test]
    fn test_parse_diskstats() {
        assert_eq!(parse_diskstats(DISKSTATS, "nvme0n1"), Some((3145728, 2097152)));
        assert_eq!(parse_diskstats(DISKSTATS, "sda"), Some((100, 200)));
        assert_eq!(parse_diskstats(DISKSTATS, "sdb"), None);
    }

    #[test]
    fn test_parse_root_device() {
        let mounts = "proc /proc proc rw 0 0\n/dev/nvme0n1p2 / ext4 rw,relatime 0 0\n/dev/nvme0n1p1 /boot vfat rw 0 0\n";
        assert_eq!(parse_root_device(mounts).as_deref(), Some("/dev/nvme0n1p2"));
        assert_eq!(parse_root_device("overlay / overlay rw 0 0\n"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_root_disk_resolves_partition() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::write(root.join("proc/mounts"), "/dev/nvme0n1p2 / ext4 rw 0 0\n").unwrap();

        let partition = root.join("sys/devices/pci0000:00/nvme/nvme0/nvme0n1/nvme0n1p2");
        fs::create_dir_all(&partition).unwrap();
        fs::write(partition.join("partition"), "2\n").unwrap();
        fs::create_dir_all(root.join("sys/class/block")).unwrap();
        std::os::unix::fs::symlink(&partition, root.join("sys/class/block/nvme0n1p2")).unwrap();

        assert_eq!(root_disk_in(root).as_deref(), Some("nvme0n1"));
    }

    #[test]
    fn test_root_disk_whole_device() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::write(dir.path().join("proc/mounts"), "/dev/vda / ext4 rw 0 0\n").unwrap();
        assert_eq!(root_disk_in(dir.path()).as_deref(), Some("vda"));
    }

    #[test]
    fn test_discover_skips_pseudo_devices() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["sda", "loop0", "zram0", "nvme0n1", "ram1"] {
            fs::create_dir_all(dir.path().join("sys/block").join(name)).unwrap();
        }
        let names: Vec<String> = discover(dir.path())
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["nvme0n1", "sda"]);
    }
}
