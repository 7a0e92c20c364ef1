use indexmap::IndexMap;

use crate::types::Method;

/// Page size applied when a page number is requested without a size
pub const DEFAULT_PAGE_SIZE: u64 = 50;

/// One client request against a resource. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    method: Method,
    url: String,
    id: Option<String>,
    include: Vec<String>,
    sort: Vec<String>,
    filter: IndexMap<String, String>,
    page_number: Option<u64>,
    page_size: Option<u64>,
    body: Option<String>,
    user: Option<String>,
}

impl RequestContext {
    pub fn builder(method: Method, url: impl Into<String>) -> RequestContextBuilder {
        RequestContextBuilder {
            ctx: RequestContext {
                method,
                url: url.into(),
                id: None,
                include: vec![],
                sort: vec![],
                filter: IndexMap::new(),
                page_number: None,
                page_size: None,
                body: None,
                user: None,
            },
        }
    }

    /// Build from a raw query string: `include=a,b`, `sort=-a,+b`, `filter[col]=v`,
    /// `page[number]=n`, `page[size]=n`. Unknown parameters are ignored.
    pub fn from_query(
        method: Method,
        url: impl Into<String>,
        id: Option<String>,
        query: Option<&str>,
        body: Option<String>,
        user: Option<String>,
    ) -> Self {
        let mut builder = Self::builder(method, url);
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            builder = builder.id(id);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(user) = user {
            builder = builder.user(user);
        }

        let mut page_number = None;
        let mut page_size = None;
        for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "include" => {
                    builder = builder.include(split_list(&value));
                }
                "sort" => {
                    // a literal '+' arrives as a space after form decoding
                    let tokens = value
                        .split(',')
                        .filter(|token| !token.trim().is_empty())
                        .map(|token| match token.strip_prefix(' ') {
                            Some(rest) => format!("+{}", rest.trim()),
                            None => token.trim().to_string(),
                        })
                        .collect();
                    builder = builder.sort(tokens);
                }
                "page[number]" => page_number = value.trim().parse::<u64>().ok().map(|n| n.max(1)),
                "page[size]" => page_size = value.trim().parse::<u64>().ok().filter(|n| *n > 0),
                other => {
                    if let Some(column) = other.strip_prefix("filter[").and_then(|rest| rest.strip_suffix(']')) {
                        builder = builder.filter(column, value.as_ref());
                    }
                }
            }
        }
        if let Some(number) = page_number {
            builder = builder.page(number, page_size);
        }
        builder.build()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn sort(&self) -> &[String] {
        &self.sort
    }

    pub fn filter(&self) -> &IndexMap<String, String> {
        &self.filter
    }

    pub fn page_number(&self) -> Option<u64> {
        self.page_number
    }

    /// Requested size, or [`DEFAULT_PAGE_SIZE`] when only a page number was given
    pub fn page_size(&self) -> Option<u64> {
        match (self.page_number, self.page_size) {
            (_, Some(size)) => Some(size),
            (Some(_), None) => Some(DEFAULT_PAGE_SIZE),
            (None, None) => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// No include, filter, sort or page parameters
    pub fn is_plain(&self) -> bool {
        self.include.is_empty() && self.filter.is_empty() && self.sort.is_empty() && self.page_number.is_none()
    }
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

pub struct RequestContextBuilder {
    ctx: RequestContext,
}

impl RequestContextBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ctx.id = Some(id.into());
        self
    }

    pub fn include(mut self, include: Vec<String>) -> Self {
        self.ctx.include = include;
        self
    }

    pub fn sort(mut self, sort: Vec<String>) -> Self {
        self.ctx.sort = sort;
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.filter.insert(column.into(), value.into());
        self
    }

    pub fn page(mut self, number: u64, size: Option<u64>) -> Self {
        self.ctx.page_number = Some(number);
        self.ctx.page_size = size;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.ctx.body = Some(body.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.ctx.user = Some(user.into());
        self
    }

    pub fn build(self) -> RequestContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() {
        let ctx = RequestContext::from_query(
            Method::Get,
            "http://localhost/widgets",
            None,
            Some("include=owner,comments&sort=-name,%2Bsize&filter[color]=red&page[number]=2&page[size]=10"),
            None,
            Some("7".into()),
        );
        assert_eq!(ctx.include(), &["owner".to_string(), "comments".to_string()]);
        assert_eq!(ctx.sort(), &["-name".to_string(), "+size".to_string()]);
        assert_eq!(ctx.filter().get("color").map(String::as_str), Some("red"));
        assert_eq!(ctx.page_number(), Some(2));
        assert_eq!(ctx.page_size(), Some(10));
        assert_eq!(ctx.user(), Some("7"));
        assert!(!ctx.is_plain());
    }

    #[test]
    fn unescaped_plus_in_sort_means_ascending() {
        let ctx = RequestContext::from_query(Method::Get, "/widgets", None, Some("sort=+name"), None, None);
        assert_eq!(ctx.sort(), &["+name".to_string()]);
    }

    #[test]
    fn page_size_defaults_only_with_page_number() {
        let ctx = RequestContext::builder(Method::Get, "/widgets").page(1, None).build();
        assert_eq!(ctx.page_size(), Some(DEFAULT_PAGE_SIZE));

        let plain = RequestContext::builder(Method::Get, "/widgets").build();
        assert_eq!(plain.page_size(), None);
        assert!(plain.is_plain());
    }

    #[test]
    fn empty_id_is_no_id() {
        let ctx = RequestContext::from_query(Method::Delete, "/widgets", Some(String::new()), None, None, None);
        assert_eq!(ctx.id(), None);
    }
}
