//! Property-based tests for the output retrieval cursor
//!
//! For any sequence of chunks with retrievals interleaved at arbitrary
//! points, the retrieved text concatenates to the full output up to the last
//! newline seen at each call: no gaps, duplicates or reordering.

use proptest::prelude::*;
use shellproc_session::OutputBuffer;

/// Chunks mixing plain text, newlines and multi-byte characters
fn chunk_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("\n".to_string()),
            Just("é".to_string()),
            Just("日本".to_string()),
            "[a-z ]{1,8}",
        ],
        0..6,
    )
    .prop_map(|parts| parts.concat())
}

/// A chunk plus whether to retrieve right after appending it
fn steps_strategy() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::vec((chunk_strategy(), any::<bool>()), 0..30)
}

proptest! {
    #[test]
    fn prop_retrievals_concatenate_to_complete_lines(steps in steps_strategy()) {
        let mut buffer = OutputBuffer::new();
        let mut retrieved = String::new();

        for (chunk, retrieve) in &steps {
            buffer.append(chunk);
            if *retrieve {
                let text = buffer.take_unretrieved();
                let full = buffer.full_output();
                let expected_end = full.rfind('\n').map(|i| i + 1).unwrap_or(0);

                retrieved.push_str(&text);
                prop_assert_eq!(&retrieved[..], &full[..expected_end]);
            }
        }

        retrieved.push_str(&buffer.take_unretrieved());
        let full = buffer.full_output();
        let last_newline = full.rfind('\n').map(|i| i + 1).unwrap_or(0);
        prop_assert_eq!(&retrieved[..], &full[..last_newline]);
        prop_assert_eq!(buffer.cursor(), last_newline);
        prop_assert!(buffer.cursor() <= buffer.len());
    }

    #[test]
    fn prop_second_retrieval_is_empty(steps in steps_strategy()) {
        let mut buffer = OutputBuffer::new();
        for (chunk, _) in &steps {
            buffer.append(chunk);
        }

        let _ = buffer.take_unretrieved();
        prop_assert_eq!(buffer.take_unretrieved(), "");
    }

    #[test]
    fn prop_retrieved_text_ends_on_newline(steps in steps_strategy()) {
        let mut buffer = OutputBuffer::new();
        for (chunk, retrieve) in &steps {
            buffer.append(chunk);
            if *retrieve {
                let text = buffer.take_unretrieved();
                prop_assert!(text.is_empty() || text.ends_with('\n'));
                prop_assert!(buffer.full_output().is_char_boundary(buffer.cursor()));
            }
        }
    }
}
