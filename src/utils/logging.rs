use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Optional append-only transcript log. Inactive until a path is set;
/// an inactive logger swallows writes so callers never branch on state.
pub struct LoggingState {
    file_path: Option<String>,
    is_active: bool,
}

impl LoggingState {
    pub fn new(log_file: Option<String>) -> Self {
        let is_active = log_file.is_some();
        LoggingState {
            file_path: log_file,
            is_active,
        }
    }

    pub fn set_log_file(&mut self, path: String) -> Result<(), Box<dyn std::error::Error>> {
        self.test_file_access(&path)?;
        self.file_path = Some(path);
        self.is_active = true;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn log_message(&self, content: &str) -> Result<(), Box<dyn std::error::Error>> {
        if !self.is_active {
            return Ok(());
        }
        let Some(file_path) = self.file_path.as_ref() else {
            return Ok(());
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        let mut writer = BufWriter::new(file);

        // Preserve the message's own line structure, then a blank spacer line.
        for line in content.lines() {
            writeln!(writer, "{line}")?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn status_string(&self) -> String {
        match (&self.file_path, self.is_active) {
            (None, _) => "disabled".to_string(),
            (Some(path), true) => format!(
                "active ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
            (Some(path), false) => format!(
                "paused ({})",
                Path::new(path)
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
            ),
        }
    }

    fn test_file_access(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn inactive_logger_writes_nothing() {
        let logging = LoggingState::new(None);
        assert!(!logging.is_active());
        logging.log_message("dropped").unwrap();
        assert_eq!(logging.status_string(), "disabled");
    }

    #[test]
    fn log_message_appends_with_spacing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transcript.log");
        let mut logging = LoggingState::new(None);
        logging
            .set_log_file(path.to_string_lossy().into_owned())
            .unwrap();

        logging.log_message("first\nsecond").unwrap();
        logging.log_message("third").unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n\nthird\n\n");
    }
}
