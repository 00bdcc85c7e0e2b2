use super::command_channel::{parse_payload, ControlCommand, Vocabulary};
use crate::error::CamResult;
use log::warn;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Secondary control channel: a token left in a well-known file, consumed
/// and deleted by the poller.
#[derive(Clone, Debug)]
pub struct CommandFile {
    path: PathBuf,
}

impl CommandFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the pending command if there is one; the file is removed even
    /// when its content does not parse.
    pub fn take<C: Vocabulary>(&self) -> Option<C> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Reading {}: {}", self.path.display(), e);
                return None;
            }
        };
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Removing {}: {}", self.path.display(), e);
        }
        parse_payload(&bytes)
    }

    pub fn post(&self, token: &str) -> CamResult<()> {
        fs::write(&self.path, token)?;
        Ok(())
    }

    pub fn post_command(&self, command: ControlCommand) -> CamResult<()> {
        self.post(command.as_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_consumes_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = CommandFile::new(dir.path().join("video_control_cmd"));

        assert_eq!(file.take::<ControlCommand>(), None);

        file.post("start\n").unwrap();
        assert_eq!(file.take::<ControlCommand>(), Some(ControlCommand::Start));
        assert!(!file.path().exists());
        assert_eq!(file.take::<ControlCommand>(), None);
    }

    #[test]
    fn test_post_command_writes_canonical_token() {
        let dir = tempfile::tempdir().unwrap();
        let file = CommandFile::new(dir.path().join("cmd"));

        let command = ControlCommand::parse_token("stop").unwrap();
        file.post_command(command).unwrap();
        assert_eq!(fs::read_to_string(file.path()).unwrap(), "stop");
        assert_eq!(file.take::<ControlCommand>(), Some(ControlCommand::Stop));

        assert_eq!(ControlCommand::parse_token("rewind"), None);
    }

    #[test]
    fn test_garbage_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let file = CommandFile::new(dir.path().join("cmd"));
        file.post("rewind").unwrap();

        assert_eq!(file.take::<ControlCommand>(), None);
        assert!(!file.path().exists());
    }
}
