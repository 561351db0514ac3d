//! Convenience macros for module development.

/// Builds a [`ModuleManifest`](crate::manifest::ModuleManifest) inline.
///
/// # Example
/// ```rust
/// use apphost_module::module_manifest;
///
/// let manifest = module_manifest!(
///     name: "Clock",
///     version: "1.0",
///     kind: App,
///     depends: ["core"],
///     route: "/clock"
/// );
/// assert_eq!(manifest.depends, vec!["core"]);
/// ```
#[macro_export]
macro_rules! module_manifest {
    (
        name: $name:expr,
        version: $version:expr,
        kind: $kind:ident
        $(, depends: [$($dep:expr),* $(,)?])?
        $(, route: $route:expr)?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut manifest = $crate::manifest::ModuleManifest::new(
            $name,
            $version,
            $crate::manifest::ModuleKind::$kind,
        );
        $($(
            manifest = manifest.depends_on($dep);
        )*)?
        $(
            manifest = manifest.with_route($route);
        )?
        manifest
    }};
}
