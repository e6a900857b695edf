pub mod download;
pub mod gmail;
pub mod notion;
pub mod resend;
pub mod slack;

pub use download::DownloadExporter;
pub use gmail::GmailExporter;
pub use notion::NotionExporter;
pub use resend::ResendExporter;
pub use slack::SlackExporter;

/// Shared markdown → HTML rendering used by the email-shaped exporters
/// (resend, gmail, download's `html` format).
pub(crate) fn markdown_to_html(title: &str, content: &str) -> String {
    use pulldown_cmark::{html, Options, Parser};

    let mut body = String::new();
    html::push_html(&mut body, Parser::new_ext(content, Options::all()));
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body>{body}</body></html>"
    )
}
