//! Component metadata used for availability checks.
//!
//! A snapshot records the identifier of the component that captured it. Before
//! the snapshot is entered, the engine asks a [`ComponentMetadata`]
//! implementation whether that component is still deployed.

use crate::errors::{ContextError, Result, Scope};
use dashmap::DashSet;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;

const SEPARATOR: char = '#';

/// Identifies an application, a module within it, or a component within that.
///
/// The text form is `app`, `app#module` or `app#module#component`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataIdentifier {
    application: String,
    module: Option<String>,
    component: Option<String>,
}

impl MetadataIdentifier {
    /// Identifies an application.
    #[must_use]
    pub fn application(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            module: None,
            component: None,
        }
    }

    /// Narrows the identifier to a module.
    #[must_use]
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Narrows the identifier to a component within `module`.
    #[must_use]
    pub fn component(mut self, module: impl Into<String>, component: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self.component = Some(component.into());
        self
    }

    /// Parses the text form.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(SEPARATOR).collect();
        if parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
            return Err(ContextError::InvalidConfiguration(format!(
                "malformed metadata identifier '{text}'"
            )));
        }

        Ok(Self {
            application: parts[0].to_string(),
            module: parts.get(1).map(|s| (*s).to_string()),
            component: parts.get(2).map(|s| (*s).to_string()),
        })
    }

    /// Returns the application name.
    #[must_use]
    pub fn application_name(&self) -> &str {
        &self.application
    }

    /// Returns the module name, if any.
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Returns the component name, if any.
    #[must_use]
    pub fn component_name(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// Returns the narrowest scope the identifier names, with that scope's name.
    #[must_use]
    pub fn most_specific(&self) -> (Scope, &str) {
        match (&self.module, &self.component) {
            (Some(_), Some(component)) => (Scope::Component, component.as_str()),
            (Some(module), None) => (Scope::Module, module.as_str()),
            _ => (Scope::Application, self.application.as_str()),
        }
    }

    fn module_key(&self) -> Option<String> {
        self.module
            .as_ref()
            .map(|m| format!("{}{SEPARATOR}{m}", self.application))
    }
}

impl fmt::Display for MetadataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.application)?;
        if let Some(module) = &self.module {
            write!(f, "{SEPARATOR}{module}")?;
            if let Some(component) = &self.component {
                write!(f, "{SEPARATOR}{component}")?;
            }
        }
        Ok(())
    }
}

/// Source of component identity and liveness.
#[cfg_attr(test, mockall::automock)]
pub trait ComponentMetadata: Send + Sync {
    /// Identifier of the component running on the current thread, if any.
    fn current_identifier(&self) -> Option<String>;

    /// Whether the identified application, module or component is deployed.
    fn is_available(&self, identifier: &MetadataIdentifier) -> bool;
}

/// Metadata source for environments without deployed components.
///
/// Never reports a current component and treats everything as available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoComponentMetadata;

impl ComponentMetadata for NoComponentMetadata {
    fn current_identifier(&self) -> Option<String> {
        None
    }

    fn is_available(&self, _identifier: &MetadataIdentifier) -> bool {
        true
    }
}

thread_local! {
    static CURRENT_COMPONENT: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// In-memory record of deployed applications, modules and components.
///
/// The current component is tracked per thread through [`ComponentScope`]
/// guards returned by [`begin`](Self::begin).
#[derive(Debug, Default)]
pub struct DeployedComponents {
    live: DashSet<String>,
}

impl DeployedComponents {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an identifier and all of its enclosing scopes as deployed.
    pub fn deploy(&self, identifier: &MetadataIdentifier) {
        self.live.insert(identifier.application.clone());
        if let Some(module_key) = identifier.module_key() {
            self.live.insert(module_key);
        }
        if identifier.component.is_some() {
            self.live.insert(identifier.to_string());
        }
    }

    /// Marks an identifier and everything nested in it as undeployed.
    pub fn undeploy(&self, identifier: &MetadataIdentifier) {
        let key = identifier.to_string();
        let nested = format!("{key}{SEPARATOR}");
        self.live.retain(|k| k != &key && !k.starts_with(&nested));
    }

    /// Runs the current thread as the identified component until the guard drops.
    #[must_use]
    pub fn begin(&self, identifier: &MetadataIdentifier) -> ComponentScope {
        CURRENT_COMPONENT.with(|stack| stack.borrow_mut().push(identifier.to_string()));
        ComponentScope {
            _thread_bound: PhantomData,
        }
    }
}

impl ComponentMetadata for DeployedComponents {
    fn current_identifier(&self) -> Option<String> {
        CURRENT_COMPONENT.with(|stack| stack.borrow().last().cloned())
    }

    fn is_available(&self, identifier: &MetadataIdentifier) -> bool {
        if !self.live.contains(&identifier.application) {
            return false;
        }
        if let Some(module_key) = identifier.module_key() {
            if !self.live.contains(&module_key) {
                return false;
            }
        }
        identifier.component.is_none() || self.live.contains(&identifier.to_string())
    }
}

/// Guard that ends a component scope started by [`DeployedComponents::begin`].
#[derive(Debug)]
pub struct ComponentScope {
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for ComponentScope {
    fn drop(&mut self) {
        CURRENT_COMPONENT.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id = MetadataIdentifier::parse("shop#web.war#CartServlet").unwrap();
        assert_eq!(id.application_name(), "shop");
        assert_eq!(id.module_name(), Some("web.war"));
        assert_eq!(id.component_name(), Some("CartServlet"));
        assert_eq!(id.to_string(), "shop#web.war#CartServlet");
        assert_eq!(id.most_specific(), (Scope::Component, "CartServlet"));

        let app = MetadataIdentifier::parse("shop").unwrap();
        assert_eq!(app.most_specific(), (Scope::Application, "shop"));
    }

    #[test]
    fn test_component_always_carries_its_module() {
        let id = MetadataIdentifier::application("shop").component("web.war", "CartServlet");
        assert_eq!(id.to_string(), "shop#web.war#CartServlet");
        assert_eq!(id.most_specific(), (Scope::Component, "CartServlet"));
        assert_eq!(MetadataIdentifier::parse(&id.to_string()).unwrap(), id);

        let components = DeployedComponents::new();
        components.deploy(&id);
        let module = MetadataIdentifier::application("shop").module("web.war");
        assert!(components.is_available(&module));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MetadataIdentifier::parse("").is_err());
        assert!(MetadataIdentifier::parse("a##c").is_err());
        assert!(MetadataIdentifier::parse("a#b#c#d").is_err());
    }

    #[test]
    fn test_deploy_and_undeploy() {
        let components = DeployedComponents::new();
        let servlet = MetadataIdentifier::application("shop")
            .component("web.war", "CartServlet");
        components.deploy(&servlet);

        assert!(components.is_available(&servlet));
        assert!(components.is_available(&MetadataIdentifier::application("shop")));

        components.undeploy(&MetadataIdentifier::application("shop").module("web.war"));
        assert!(!components.is_available(&servlet));
        assert!(components.is_available(&MetadataIdentifier::application("shop")));
    }

    #[test]
    fn test_undeploy_application_hides_everything_nested() {
        let components = DeployedComponents::new();
        let servlet = MetadataIdentifier::application("shop")
            .component("web.war", "CartServlet");
        components.deploy(&servlet);
        components.undeploy(&MetadataIdentifier::application("shop"));

        assert!(!components.is_available(&servlet));
        assert!(components.live.is_empty());
    }

    #[test]
    fn test_component_scope_nesting() {
        let components = DeployedComponents::new();
        assert_eq!(components.current_identifier(), None);
        {
            let _outer = components.begin(&MetadataIdentifier::application("a").module("m"));
            {
                let _inner = components.begin(&MetadataIdentifier::application("b"));
                assert_eq!(components.current_identifier().as_deref(), Some("b"));
            }
            assert_eq!(components.current_identifier().as_deref(), Some("a#m"));
        }
        assert_eq!(components.current_identifier(), None);
    }
}
