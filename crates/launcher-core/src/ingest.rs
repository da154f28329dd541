use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::send_view::clip_text;
use crate::state::ChatMessage;

/// Uploaded file text is clipped to this before it joins the conversation
pub const FILE_CONTEXT_CHARS: usize = 1200;

/// Wrap a file's text as a system context message
pub fn file_context_message(name: &str, text: &str) -> ChatMessage {
    let clipped = clip_text(text, FILE_CONTEXT_CHARS);
    ChatMessage::system(format!(
        "User uploaded file \"{}\". Content (truncated):\n---BEGIN FILE---\n{}\n---END FILE---",
        name, clipped
    ))
}

/// Bytes read from a file: enough for the clipped text in any UTF-8,
/// plus one char so clipping still kicks in for longer files
const FILE_READ_LIMIT: u64 = (FILE_CONTEXT_CHARS as u64 + 1) * 4;

/// Read the start of `path` as text (invalid UTF-8 is replaced, not rejected)
pub async fn read_file_context(path: &Path) -> anyhow::Result<(String, ChatMessage)> {
    let file = tokio::fs::File::open(path).await?;
    let mut bytes = Vec::new();
    file.take(FILE_READ_LIMIT).read_to_end(&mut bytes).await?;
    let text = String::from_utf8_lossy(&bytes);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let message = file_context_message(&name, &text);
    Ok((name, message))
}
