use crate::application::error::HttpError;
use crate::domain::feeds::FeedDescriptor;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Clone, Debug)]
pub struct FeedLinkView {
    pub name: String,
    pub href: String,
    pub upstream: String,
}

impl From<&FeedDescriptor> for FeedLinkView {
    fn from(descriptor: &FeedDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            href: feed_path(descriptor),
            upstream: descriptor.url.to_string(),
        }
    }
}

/// Route path for a feed, with the name percent-encoded as one segment.
fn feed_path(descriptor: &FeedDescriptor) -> String {
    let mut link = descriptor.url.clone();
    match link.path_segments_mut() {
        Ok(mut segments) => {
            segments.clear().push("feeds").push(&descriptor.name);
        }
        Err(()) => return format!("/feeds/{}", descriptor.name),
    }
    link.path().to_string()
}

#[derive(Template)]
#[template(
    source = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>RSS Translator</title>
</head>
<body>
<h1>RSS Translator</h1>
{% if feeds.is_empty() %}
<p>No feeds configured.</p>
{% else %}
<ul>
{% for feed in feeds %}
<li><a href="{{ feed.href }}">{{ feed.name }}</a> <small>{{ feed.upstream }}</small></li>
{% endfor %}
</ul>
{% endif %}
<form method="post" action="/feeds/refresh"><button type="submit">Refresh all</button></form>
</body>
</html>
"#,
    ext = "html"
)]
pub struct IndexTemplate {
    pub feeds: Vec<FeedLinkView>,
}

impl IndexTemplate {
    pub fn new<'a>(descriptors: impl IntoIterator<Item = &'a FeedDescriptor>) -> Self {
        Self {
            feeds: descriptors.into_iter().map(FeedLinkView::from).collect(),
        }
    }
}
