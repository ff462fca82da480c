use std::io::Cursor;

use crate::BakeryError;

/// Append `bytes` to `buffer` behind a LEB128 length prefix
pub(crate) fn write_prefixed(buffer: &mut Vec<u8>, bytes: &[u8]) {
    leb128::write::unsigned(buffer, bytes.len() as u64).expect("write to Vec never fails");
    buffer.extend_from_slice(bytes);
}

/// Split a length-prefixed field off the front of `bytes`, returning the
/// field and whatever follows it
pub(crate) fn read_prefixed(bytes: &[u8]) -> Result<(&[u8], &[u8]), BakeryError> {
    let mut cursor = Cursor::new(bytes);
    let length = leb128::read::unsigned(&mut cursor)
        .map_err(|error| BakeryError::Malformed(format!("Unable to read length: {error}")))?;
    let start = cursor.position() as usize;
    let end = usize::try_from(length)
        .ok()
        .and_then(|length| start.checked_add(length))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            BakeryError::Malformed(format!(
                "Declared length {length} exceeds the {} available bytes",
                bytes.len() - start
            ))
        })?;

    Ok((&bytes[start..end], &bytes[end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn it_splits_prefixed_fields() -> TestResult {
        let mut buffer = Vec::new();
        write_prefixed(&mut buffer, b"first");
        buffer.extend_from_slice(b"rest");

        let (field, rest) = read_prefixed(&buffer)?;
        assert_eq!(field, b"first");
        assert_eq!(rest, b"rest");
        Ok(())
    }

    #[test]
    fn it_rejects_truncated_fields() {
        let mut buffer = Vec::new();
        write_prefixed(&mut buffer, &[7u8; 300]);
        buffer.truncate(100);

        assert!(matches!(
            read_prefixed(&buffer),
            Err(BakeryError::Malformed(_))
        ));
        assert!(read_prefixed(&[]).is_err());
    }
}
