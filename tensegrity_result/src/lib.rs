use std::{
    collections::HashMap,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use csv::Writer;
use thiserror::Error;

pub type ResultWriter = Writer<BufWriter<File>>;

#[derive(Debug, Error)]
pub enum ResultErrors {
    #[error("{0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("record has {1} fields but writer {0} expects {2}")]
    RecordLength(u32, usize, usize),
    #[error("could not find result writer {0}")]
    WriterNotFound(u32),
    #[error("result file {0} is already open with different headers")]
    HeaderMismatch(PathBuf),
}

struct Entry {
    writer: ResultWriter,
    headers: Vec<String>,
}

/// Owns one csv writer per simulation component, keyed by the id handed out in `new_writer`.
pub struct ResultManager {
    writers: HashMap<u32, Entry>,
    files: HashMap<PathBuf, u32>,
    pub result_path: PathBuf,
    next_id: u32,
}

impl ResultManager {
    pub fn new(result_path: PathBuf) -> Self {
        Self {
            writers: HashMap::new(),
            files: HashMap::new(),
            result_path,
            next_id: 0,
        }
    }

    pub fn new_writer(
        &mut self,
        name: &str,
        path: &Path,
        headers: &[&str],
    ) -> Result<u32, ResultErrors> {
        let file_path = path.join(name.to_string() + ".csv");
        // a file this manager already writes is continued, not truncated
        if let Some(&id) = self.files.get(&file_path) {
            let entry = &self.writers[&id];
            if entry.headers != headers {
                return Err(ResultErrors::HeaderMismatch(file_path));
            }
            return Ok(id);
        }

        std::fs::create_dir_all(path)?;
        let file = File::create(&file_path)?;
        let mut writer = Writer::from_writer(BufWriter::new(file));
        writer.write_record(headers)?;

        let id = self.next_id;
        self.writers.insert(
            id,
            Entry {
                writer,
                headers: headers.iter().map(|h| h.to_string()).collect(),
            },
        );
        self.files.insert(file_path, id);
        self.next_id += 1;
        Ok(id)
    }

    /// Number of result files this manager has open.
    pub fn writer_count(&self) -> usize {
        self.writers.len()
    }

    pub fn write_record(&mut self, id: u32, content: &[String]) -> Result<(), ResultErrors> {
        let entry = self
            .writers
            .get_mut(&id)
            .ok_or(ResultErrors::WriterNotFound(id))?;
        if content.len() != entry.headers.len() {
            return Err(ResultErrors::RecordLength(
                id,
                content.len(),
                entry.headers.len(),
            ));
        }
        entry.writer.write_record(content)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ResultErrors> {
        for entry in self.writers.values_mut() {
            entry.writer.flush()?;
        }
        Ok(())
    }
}

pub trait SimResult {
    /// Creates the writer that stores this component's time history
    fn new_result(&mut self, results: &mut ResultManager) -> Result<(), ResultErrors>;
    /// Writes the next entry in the result file
    fn write_result(&self, t: f64, results: &mut ResultManager) -> Result<(), ResultErrors>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_back() {
        let root = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        let mut results = ResultManager::new(root.clone());
        let id = results
            .new_writer("cable", &root.join("actuators"), &["t", "tension"])
            .unwrap();
        results
            .write_record(id, &["0.0".into(), "100".into()])
            .unwrap();
        results.flush().unwrap();

        let contents = std::fs::read_to_string(root.join("actuators").join("cable.csv")).unwrap();
        assert_eq!(contents, "t,tension\n0.0,100\n");
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_reopening_a_writer_appends() {
        let root = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        let mut results = ResultManager::new(root.clone());
        let path = root.join("bodies");
        let id = results.new_writer("strut", &path, &["t", "x"]).unwrap();
        results.write_record(id, &["0".into(), "1".into()]).unwrap();

        assert_eq!(results.new_writer("strut", &path, &["t", "x"]).unwrap(), id);
        results.write_record(id, &["1".into(), "2".into()]).unwrap();
        results.flush().unwrap();
        assert_eq!(results.writer_count(), 1);

        let contents = std::fs::read_to_string(path.join("strut.csv")).unwrap();
        assert_eq!(contents, "t,x\n0,1\n1,2\n");

        assert!(matches!(
            results.new_writer("strut", &path, &["t", "y"]),
            Err(ResultErrors::HeaderMismatch(_))
        ));
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_unknown_writer() {
        let mut results = ResultManager::new(PathBuf::from("unused"));
        assert!(matches!(
            results.write_record(3, &[]),
            Err(ResultErrors::WriterNotFound(3))
        ));
    }

    #[test]
    fn test_record_length_mismatch() {
        let root = std::env::temp_dir().join(uuid::Uuid::new_v4().to_string());
        let mut results = ResultManager::new(root.clone());
        let id = results.new_writer("body", &root, &["t", "x"]).unwrap();
        assert!(matches!(
            results.write_record(id, &["0.0".into()]),
            Err(ResultErrors::RecordLength(_, 1, 2))
        ));
        std::fs::remove_dir_all(root).unwrap();
    }
}
