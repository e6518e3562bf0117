/// Compose a key from parts: `key![KeyPart::Int(1), KeyPart::Str("a")]`,
/// or from anything `Into<Key>` with `key!("a")`.
#[macro_export]
macro_rules! key {
    ($single:expr) => {
        $crate::Key::from($single)
    };
    ($($part:expr),+ $(,)?) => {
        $crate::Key::compose(&[$($part),+])
    };
}
