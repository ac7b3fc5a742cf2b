//! HTML wrapper served to browsers and link unfurlers.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::storage::{FileRecord, FileType};

const SITE_NAME: &str = "ephemeral-host";

/// Path of the generic card image used for files that cannot be shown
/// inline.
pub const PLACEHOLDER_PATH: &str = "/static/file-preview.svg";

pub const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="1200" height="630" viewBox="0 0 1200 630">
<rect width="1200" height="630" fill="#0f172a"/>
<path d="M520 140h120l80 80v270H520z" fill="#1e293b" stroke="#3b82f6" stroke-width="8"/>
<path d="M640 140v80h80" fill="none" stroke="#3b82f6" stroke-width="8"/>
<text x="600" y="560" fill="#f8fafc" font-family="system-ui, sans-serif" font-size="40" text-anchor="middle">ephemeral-host</text>
</svg>
"##;

pub fn render(record: &FileRecord, site_url: &str) -> String {
    let raw_url = format!("{}?raw=true", record.share_link());
    let absolute_url = format!("{site_url}{raw_url}");
    let file_type = record.file_type();

    let image_url = match file_type {
        FileType::Image => absolute_url.clone(),
        _ => format!("{site_url}{PLACEHOLDER_PATH}"),
    };
    let og_image = format!(
        r#"<meta property="og:image" content="{}" />"#,
        attr(&image_url)
    );
    let og_description = format!(
        "File: {}\nSize: {}\nUploaded: {}",
        record.original_name,
        record.human_size,
        record.upload_time.format("%Y-%m-%d %H:%M UTC")
    );

    let name = &record.original_name;
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - {SITE_NAME}</title>
    <meta property="og:title" content="{title_attr} - {SITE_NAME}" />
    <meta property="og:description" content="{description}" />
    {og_image}
    <meta property="og:url" content="{url}" />
    <meta property="og:type" content="website" />
    <meta property="og:site_name" content="{SITE_NAME}" />
    <meta name="twitter:card" content="summary_large_image" />
    <style>
        body {{ background: #0f172a; color: #f8fafc; font-family: system-ui, sans-serif; margin: 0; padding: 1.5rem; }}
        main {{ max-width: 1024px; margin: 0 auto; display: flex; flex-direction: column; gap: 1.5rem; }}
        header, section, .preview {{ background: #1e293b; border-radius: 0.75rem; padding: 1rem 1.5rem; }}
        header {{ display: flex; justify-content: space-between; align-items: center; }}
        .preview {{ display: flex; justify-content: center; min-height: 400px; align-items: center; }}
        .preview img, .preview video {{ max-width: 100%; max-height: 70vh; border-radius: 0.5rem; }}
        dl {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 1rem; margin: 0; }}
        dt {{ color: #94a3b8; font-size: 0.875rem; }}
        a.button {{ background: #3b82f6; color: white; padding: 0.5rem 1rem; border-radius: 0.5rem; text-decoration: none; }}
    </style>
</head>
<body>
    <main>
        <header>
            <h1>{title}</h1>
            <a class="button" href="{download}" download="{title_attr}">Download</a>
        </header>
        <div class="preview">{preview}</div>
        <section>
            <dl>
                <div><dt>File Size</dt><dd>{size}</dd></div>
                <div><dt>Upload Date</dt><dd>{uploaded}</dd></div>
                <div><dt>Expires</dt><dd>{expires}</dd></div>
            </dl>
        </section>
    </main>
</body>
</html>
"#,
        title = text(name),
        title_attr = attr(name),
        description = attr(&og_description),
        url = attr(&absolute_url),
        download = attr(&format!("{raw_url}&download=true")),
        preview = preview_element(record, &raw_url, file_type),
        size = text(&record.human_size),
        uploaded = record.upload_time.format("%d/%m/%Y"),
        expires = record.expiry_time.format("%d/%m/%Y %H:%M UTC"),
    )
}

fn preview_element(record: &FileRecord, raw_url: &str, file_type: FileType) -> String {
    match file_type {
        FileType::Image => format!(
            r#"<img src="{}" alt="{}" loading="lazy" />"#,
            attr(raw_url),
            attr(&record.original_name)
        ),
        FileType::Video => format!(
            r#"<video controls><source src="{}" type="{}">Your browser does not support the video tag.</video>"#,
            attr(raw_url),
            attr(&record.mime_type)
        ),
        _ => "<p>No preview available for this file type. Use the download button above.</p>"
            .to_string(),
    }
}
