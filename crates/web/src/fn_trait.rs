//! Abstraction over async handler functions of any arity.
//!
//! [`FnTrait`] lets the framework treat `async fn(a: A, b: B) -> R` values
//! uniformly regardless of how many parameters they take (0 through 12).
//! Handler invocation goes through [`FnTrait::call`] with the extracted
//! argument tuple.

use std::future::Future;

/// An async function viewed as a handler taking the argument tuple `Args`.
pub trait FnTrait<Args>: Send + Sync {
    type Output;
    type Fut: Future<Output = Self::Output> + Send;

    fn call(&self, args: Args) -> Self::Fut;
}

macro_rules! impl_fn_trait {
    ($($arg:ident)*) => {
        impl<Func, Fut, $($arg,)*> FnTrait<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> Fut + Send + Sync,
            Fut: Future + Send,
        {
            type Output = Fut::Output;
            type Fut = Fut;

            #[inline]
            #[allow(non_snake_case, reason = "tuple fields reuse the type parameter names")]
            fn call(&self, ($($arg,)*): ($($arg,)*)) -> Self::Fut {
                (self)($($arg,)*)
            }
        }
    };
}

impl_fn_trait! {}
impl_fn_trait! { A }
impl_fn_trait! { A B }
impl_fn_trait! { A B C }
impl_fn_trait! { A B C D }
impl_fn_trait! { A B C D E }
impl_fn_trait! { A B C D E F }
impl_fn_trait! { A B C D E F G }
impl_fn_trait! { A B C D E F G H }
impl_fn_trait! { A B C D E F G H I }
impl_fn_trait! { A B C D E F G H I J }
impl_fn_trait! { A B C D E F G H I J K }
impl_fn_trait! { A B C D E F G H I J K L }

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, Method};

    fn assert_fn_trait<Args, F: FnTrait<Args>>(_f: F) {}

    async fn no_args() {}
    async fn one_arg(_method: &Method) {}
    async fn two_args(_method: &Method, _headers: &HeaderMap) {}
    async fn owned_args(_method: Method, _body: String) -> String {
        String::new()
    }

    #[test]
    fn functions_of_various_arities_qualify() {
        assert_fn_trait(no_args);
        assert_fn_trait(one_arg);
        assert_fn_trait(two_args);
        assert_fn_trait(owned_args);
    }
}
