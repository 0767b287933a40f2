use std::collections::BTreeSet;
use std::io::Result;
use std::path::Path;
use std::time::SystemTime;

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
struct LogFile {
    name: String,
    len: u64,
    modified: SystemTime,
}

/// Everything derived examples depend on besides the code: the log files as they are on disk,
/// and the number the logs give the opening over.
#[derive(Debug, Hash, PartialEq, Eq)]
pub struct Fingerprint {
    files: BTreeSet<LogFile>,
    first_over: u32,
}

impl Fingerprint {
    /// Any of the named files missing from `dir` is an error.
    pub fn read(dir: &Path, names: &[&str], first_over: u32) -> Result<Fingerprint> {
        let mut files = BTreeSet::new();
        for name in names {
            let metadata = std::fs::metadata(dir.join(name))?;
            files.insert(LogFile {
                name: (*name).to_string(),
                len: metadata.len(),
                modified: metadata.modified()?,
            });
        }
        Ok(Fingerprint { files, first_over })
    }
}

#[cfg(test)]
#[test]
fn test_fingerprint() {
    let dir = std::env::temp_dir().join(format!("ipl-win-fingerprint-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("a.csv"), "id\n1\n").unwrap();

    let one = Fingerprint::read(&dir, &["a.csv"], 1).unwrap();
    assert_eq!(one.files.len(), 1);
    assert_eq!(one.files.iter().next().unwrap().len, 5);
    assert_eq!(Fingerprint::read(&dir, &["a.csv"], 1).unwrap(), one);
    assert_ne!(Fingerprint::read(&dir, &["a.csv"], 0).unwrap(), one);
    assert!(Fingerprint::read(&dir, &["a.csv", "b.csv"], 1).is_err());

    std::fs::write(dir.join("a.csv"), "id\n1\n2\n").unwrap();
    assert_ne!(Fingerprint::read(&dir, &["a.csv"], 1).unwrap(), one);

    std::fs::remove_dir_all(&dir).ok();
}
