//! System instructions sent with each chat call.

pub const SUMMARIZE_TEXT: &str = "You are an expert text summarizer. \
Your task is to analyze the user's input text and generate a concise, \
well-structured summary of the key information. \
The final summary **must be in English**, and you must **only** output the summary text.";

pub const SUMMARIZE_VIDEO: &str = "You are an expert video summarizer. \
The following text is a video transcript. \
Analyze the transcript and generate a concise, detailed summary of the key topics, \
arguments, and conclusions. The final summary **must be in English**, and you \
must **only** output the summary text.";

pub const DETECT_LANGUAGE: &str = "Detect the language of the following text. \
Respond with ONLY the language name (e.g., 'English' or 'French') and nothing else.";

pub fn translate(from: &str, to: &str) -> String {
    format!(
        "You are a professional language translator. Translate the user's text from {from} to {to}. \
Only provide the translated text and nothing else."
    )
}
