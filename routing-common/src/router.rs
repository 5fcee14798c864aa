use crate::{
    message::Message,
    route::{Endpoint, Route},
};

/// Evaluates messages against a set of routes.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new<I>(routes: I) -> Self
    where
        I: IntoIterator<Item = Route>,
    {
        let mut routes = routes.into_iter().collect::<Vec<_>>();
        routes.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Self { routes }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Find the endpoints for a message, in order of route priority.
    ///
    /// An endpoint targeted by more than one matching route is only reported once, for the
    /// route with the highest priority.
    pub fn route(&self, message: &Message) -> Vec<&Endpoint> {
        let mut result: Vec<&Endpoint> = vec![];
        for route in &self.routes {
            if !result.contains(&&route.endpoint) && route.matches(message) {
                log::debug!("Route '{}' matches, sending to {}", route.name, route.endpoint);
                result.push(&route.endpoint);
            }
        }
        result
    }
}
