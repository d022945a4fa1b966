/// Declare a typed client for an embedded context's operations.
///
/// Generates a cloneable struct wrapping a [`Connection`](crate::Connection)
/// with one async method per declared operation. Each method packs its
/// arguments positionally, sends the call, and decodes the result into the
/// declared return type. `as "name"` sends a different wire name than the
/// Rust method name.
///
/// ```
/// frame_rpc::remote_api! {
///     /// Operations of the calculator widget.
///     pub struct Calculator {
///         fn add(a: i64, b: i64) -> i64;
///         fn greet(name: String) -> String;
///         fn reset_all as "resetAll"() -> ();
///     }
/// }
/// ```
///
/// Used as `Calculator::new(connection).add(2, 3).await`.
#[macro_export]
macro_rules! remote_api {
    (@name $method:ident $remote:literal) => {
        $remote
    };
    (@name $method:ident) => {
        stringify!($method)
    };

    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fn_meta:meta])*
                fn $method:ident $(as $remote:literal)? ( $($arg:ident : $ty:ty),* $(,)? ) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            connection: $crate::Connection,
        }

        impl $name {
            pub fn new(connection: $crate::Connection) -> Self {
                Self { connection }
            }

            pub fn connection(&self) -> &$crate::Connection {
                &self.connection
            }

            $(
                $(#[$fn_meta])*
                pub async fn $method(&self, $($arg: $ty),*) -> $crate::Result<$ret> {
                    self.connection
                        .call($crate::remote_api!(@name $method $($remote)?), ($($arg,)*))
                        .await
                }
            )*
        }
    };
}
