//! Extraction of shared state registered on routes and scopes.

use async_trait::async_trait;

use crate::body::OptionReqBody;
use crate::extract::{ExtractError, FromRequest, State};
use crate::request::RequestContext;
use crate::state::state_type_name;

/// Looks `T` up in the route's merged state map.
///
/// Absence is a server misconfiguration, not a client error, so it maps
/// to `500`.
#[async_trait]
impl<T> FromRequest for State<T>
where
    T: Send + Sync + 'static,
{
    type Output<'r> = State<T>;
    type Error = ExtractError;

    async fn from_request<'r>(ctx: &'r RequestContext, _body: OptionReqBody) -> Result<Self::Output<'r>, Self::Error> {
        ctx.state().get::<T>().map(State).ok_or(ExtractError::MissingState { type_name: state_type_name::<T>() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{QueryMap, RequestContext};
    use crate::router::PathInfo;
    use crate::state::StateMap;
    use crate::test_request::{TestRequest, loopback_connect_info};

    fn ctx_with_state(state: StateMap) -> RequestContext {
        let (head, _) = TestRequest::get().into_parts("/");
        RequestContext::new(head, loopback_connect_info(), PathInfo::none("/".into()), QueryMap::default(), state)
    }

    #[tokio::test]
    async fn present_state_is_shared() {
        let mut state = StateMap::new();
        state.insert(7usize);

        let ctx = ctx_with_state(state);
        let value = State::<usize>::from_request(&ctx, OptionReqBody::empty()).await.unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn missing_state_is_a_server_error() {
        let ctx = ctx_with_state(StateMap::new());
        let result = State::<usize>::from_request(&ctx, OptionReqBody::empty()).await;
        assert!(matches!(result, Err(ExtractError::MissingState { .. })));
    }
}
