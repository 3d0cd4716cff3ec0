//! Sketch document streams
//!
//! External units report their side effects as a YAML multi-document
//! stream, one sketch per document:
//!
//! ```yaml
//! ---
//! type: fileAccess
//! path: x.txt
//! mode: READ
//! ---
//! type: message
//! level: INFO
//! message: Hello
//! ```

use crate::action::Sketch;
use crate::error::DocumentError;
use serde::Deserialize;
use std::io::Write;

/// Decode every sketch of a stream; empty documents are skipped
///
/// # Errors
/// Returns [`DocumentError::Malformed`] naming the first bad document
pub fn read_sketches(text: &str) -> Result<Vec<Sketch>, DocumentError> {
    let mut sketches = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let sketch = Option::<Sketch>::deserialize(document)
            .map_err(|source| DocumentError::Malformed { index, source })?;
        sketches.extend(sketch);
    }
    Ok(sketches)
}

/// Encode sketches as a stream, each document introduced by `---`
///
/// # Errors
/// Returns error if encoding or writing fails
pub fn write_sketches<W: Write>(writer: &mut W, sketches: &[Sketch]) -> Result<(), DocumentError> {
    for sketch in sketches {
        let document = serde_yaml::to_string(sketch).map_err(DocumentError::Encode)?;
        writer.write_all(b"---\n")?;
        writer.write_all(document.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{DirectoryMode, FileMode};
    use crate::level::MessageLevel;
    use std::path::PathBuf;

    #[test]
    fn reads_hand_written_stream() {
        let text = "---\ntype: fileAccess\npath: x.txt\nmode: READ\n---\ntype: message\nlevel: INFO\nmessage: Hello\n---\ntype: exit\nexitCode: 0\n";
        let sketches = read_sketches(text).unwrap();
        assert_eq!(
            sketches,
            vec![
                Sketch::file("x.txt", FileMode::Read),
                Sketch::message(MessageLevel::Info, "Hello"),
                Sketch::Exit { exit_code: 0 },
            ]
        );
    }

    #[test]
    fn empty_stream_has_no_sketches() {
        assert!(read_sketches("").unwrap().is_empty());
        assert!(read_sketches("---\n").unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_located() {
        let text = "---\ntype: exit\nexitCode: 1\n---\ntype: teleport\n";
        match read_sketches(text) {
            Err(DocumentError::Malformed { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected malformed error, got {other:?}"),
        }
    }

    #[test]
    fn written_stream_reads_back() {
        let sketches = vec![
            Sketch::DirectoryAccess {
                path: PathBuf::from("gen"),
                pattern: Some("*.rs".to_string()),
                mode: DirectoryMode::List,
            },
            Sketch::file("gen/lib.rs", FileMode::Create),
        ];
        let mut buffer = Vec::new();
        write_sketches(&mut buffer, &sketches).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.starts_with("---\n"));
        assert_eq!(read_sketches(&text).unwrap(), sketches);
    }
}
