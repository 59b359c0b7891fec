//! Direct return of the assembled document to the chat it was built for.

use crate::assembler::AssembledDocument;
use crate::message::{ChannelMessage, OutgoingContent, OutgoingMessage};
use crate::traits::{Channel, ChannelResult};
use photomerge_common::util::format_bytes;

pub const PDF_MIME: &str = "application/pdf";

/// `<name>.<extension>`, with the name passed through untouched.
pub fn document_file_name(name: &str, extension: &str) -> String {
    format!("{name}.{}", extension.trim_start_matches('.'))
}

/// Send the document as a file into the chat `to` came from.
///
/// Transport failures are returned as-is.
pub async fn deliver<C: Channel>(
    channel: &C,
    to: &ChannelMessage,
    document: &AssembledDocument,
    file_name: &str,
    extension: &str,
) -> ChannelResult<()> {
    let filename = document_file_name(file_name, extension);
    let message = OutgoingMessage {
        channel_type: to.channel_type,
        channel_id: to.channel_id.clone(),
        reply_to: None,
        content: OutgoingContent::File {
            data: document.to_vec(),
            filename: filename.clone(),
            mime_type: Some(PDF_MIME.to_string()),
        },
    };

    channel.send(message).await?;

    tracing::info!(
        chat_id = %to.channel_id,
        user_id = %to.user_id,
        filename = %filename,
        size = %format_bytes(document.len() as u64),
        pages = document.page_count(),
        "Document delivered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_gets_extension() {
        assert_eq!(document_file_name("trip", "pdf"), "trip.pdf");
        assert_eq!(document_file_name("trip", ".pdf"), "trip.pdf");
        assert_eq!(document_file_name("a/b c", "pdf"), "a/b c.pdf");
        assert_eq!(document_file_name("report.pdf", "pdf"), "report.pdf.pdf");
    }
}
