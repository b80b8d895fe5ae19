pub mod consent;

pub use consent::{
    Button, ConsentForm, ConsentQuery, ConsentRequest, ConsentResponse,
    ScopeItem, ScopeRegion,
};
