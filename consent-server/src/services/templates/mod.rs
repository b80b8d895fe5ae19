use askama::Template;

use crate::models::{ConsentRequest, ScopeRegion};

#[derive(Template, Debug)]
#[template(path = "consent.html")]
pub struct ConsentView {
    pub request: ConsentRequest,
    pub regions: Vec<ScopeRegion>,
    pub remember_consent: bool,
    pub errors: Vec<String>,
}

impl ConsentView {
    pub fn new(request: ConsentRequest) -> Self {
        Self {
            regions: request.regions(),
            request,
            remember_consent: true,
            errors: Vec::new(),
        }
    }

    pub fn remember_consent(mut self, remember_consent: bool) -> Self {
        self.remember_consent = remember_consent;
        self
    }

    pub fn errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}
