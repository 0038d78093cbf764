/// A macro wrapper for returning an error value that allows logging of
/// errors.
///
/// Specifically, in debug build mode (and if the `log` feature is enabled),
/// before the error is returned a call is made to the requested [`log`]
/// level that describes the error and where it was raised.  With the
/// `backtrace` feature, a stack backtrace follows at the same level.
///
/// Usage: `err!(trace, U) -> U`
macro_rules! err {
  ($level:ident, $error:expr) => {{
    let error = $error;

    #[cfg(all(debug_assertions, feature = "log"))]
    {
      ::log::$level!("{}:{}: {:?}", file!(), line!(), &error);
      #[cfg(feature = "backtrace")]
      ::log::$level!("{:?}", ::backtrace::Backtrace::new());
    }

    error
  }};
}
