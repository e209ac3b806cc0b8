//! Random-colour SVG favicon.

use axum::http::{header, HeaderValue};

use crate::http::{Context, HttpError, Reply, Request, Response};

pub fn favicon(_request: &Request, _context: &Context) -> Result<Reply, HttpError> {
    let (r, g, b) = (fastrand::u8(..), fastrand::u8(..), fastrand::u8(..));
    let svg = format!(
        r##"<svg viewBox="0 0 10 10" xmlns="http://www.w3.org/2000/svg" width="16" height="16">
	<rect x="0" y="0" rx="1" ry="1" width="10" height="10" fill="#{r:02x}{g:02x}{b:02x}"></rect>
</svg>"##
    );
    let mut response = Response::new(svg);
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
    Ok(response.into())
}
