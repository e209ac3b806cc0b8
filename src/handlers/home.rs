//! HTML landing page describing the request.

use crate::handlers::describe;
use crate::http::{Context, HttpError, Reply, Request, Response};

pub fn home(request: &Request, context: &Context) -> Result<Reply, HttpError> {
    let info = serde_json::to_string_pretty(&describe(request, context))?;
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en" dir="ltr">
	<head>
		<meta charset="utf-8" />
		<meta name="viewport" content="width=device-width" />
		<meta name="color-scheme" content="light dark" />
		<meta name="referrer" content="no-referrer" />
		<base href="{base}" />
		<title>quay</title>
		<link rel="icon" href="/favicon.svg" type="image/svg+xml" sizes="any" />
	</head>
	<body>
		<pre><code>{info}</code></pre>
	</body>
</html>"#,
        base = escape(request.url().as_str()),
        info = escape(&info),
    );
    Ok(Response::html(html).into())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
