//! # Examples
//!
//! Print a file
//!
//! ```rust,no_run
//! use std::fs::File;
//!
//! use xdg_portal::desktop::print::{PreparePrintOptions, PrintOptions, PrintProxy};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let proxy = PrintProxy::new().await?;
//!
//!     let file = File::open("/home/jdoe/gitlog.pdf").expect("file to print was not found");
//!     let pre_print = proxy
//!         .prepare_print(
//!             None,
//!             "prepare print",
//!             Default::default(),
//!             Default::default(),
//!             PreparePrintOptions::default().modal(true),
//!             None,
//!         )
//!         .await?;
//!     proxy
//!         .print(
//!             None,
//!             "test",
//!             &file,
//!             PrintOptions::default().token(pre_print.token()).modal(true),
//!             None,
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::os::fd::AsFd;

use serde::{Deserialize, Serialize};
use zbus::zvariant::{
    as_value::{self, optional},
    Fd, Type,
};

use super::{HandleToken, ResponseError};
use crate::{
    proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable, Error, Portal,
    WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.Print";

#[derive(Debug, Copy, Clone, Deserialize, Serialize, PartialEq, Eq, Type)]
#[zvariant(signature = "s")]
#[serde(rename_all = "snake_case")]
/// The page orientation.
pub enum Orientation {
    /// Landscape.
    Landscape,
    /// Portrait.
    Portrait,
    /// Reverse landscape.
    ReverseLandscape,
    /// Reverse portrait.
    ReversePortrait,
}

#[derive(Debug, Copy, Clone, Deserialize, Serialize, PartialEq, Eq, Type)]
#[zvariant(signature = "s")]
#[serde(rename_all = "lowercase")]
/// The print quality.
pub enum Quality {
    /// Draft quality.
    Draft,
    /// Low quality.
    Low,
    /// Normal quality.
    Normal,
    /// High quality.
    High,
}

#[derive(Debug, Copy, Clone, Deserialize, Serialize, PartialEq, Eq, Type)]
#[zvariant(signature = "s")]
#[serde(rename_all = "lowercase")]
/// Which pages to print.
pub enum PrintPages {
    /// All the pages.
    All,
    /// The current page.
    Current,
    /// The page ranges of [`Settings::page_ranges`].
    Ranges,
    /// The selected pages.
    Selection,
}

#[derive(Debug, Copy, Clone, Deserialize, Serialize, PartialEq, Eq, Type)]
#[zvariant(signature = "s")]
#[serde(rename_all = "lowercase")]
/// The format used when printing to a file.
pub enum OutputFileFormat {
    /// PDF.
    Pdf,
    /// PostScript.
    Ps,
    /// SVG.
    Svg,
}

// Booleans and numbers of the settings dict travel as strings.
mod string_bool {
    use serde::{de::Error, Deserializer, Serializer};
    use zbus::zvariant::as_value::optional;

    pub fn serialize<S>(value: &Option<bool>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        optional::serialize(&value.map(|v| if v { "true" } else { "false" }), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = optional::deserialize(deserializer)?;
        opt.map(|s| match s.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(D::Error::custom(format!("invalid boolean string: {s}"))),
        })
        .transpose()
    }
}

mod string_u32 {
    use serde::{de::Error, Deserializer, Serializer};
    use zbus::zvariant::as_value::optional;

    pub fn serialize<S>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        optional::serialize(&value.map(|v| v.to_string()), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = optional::deserialize(deserializer)?;
        opt.map(|s| s.parse::<u32>().map_err(D::Error::custom))
            .transpose()
    }
}

#[derive(Serialize, Deserialize, Type, Debug, Default, Clone, PartialEq)]
/// Print settings to set in the print dialog.
#[zvariant(signature = "dict")]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    /// The page orientation.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    /// A paper name according to PWG 5101.1-2002.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub paper_format: Option<String>,
    /// The number of copies to print.
    #[serde(default, with = "string_u32", skip_serializing_if = "Option::is_none")]
    pub n_copies: Option<u32>,
    /// Print quality.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    /// Whether to use color.
    #[serde(default, with = "string_bool", skip_serializing_if = "Option::is_none")]
    pub use_color: Option<bool>,
    /// Whether to collate copies.
    #[serde(default, with = "string_bool", skip_serializing_if = "Option::is_none")]
    pub collate: Option<bool>,
    /// Whether to reverse the order of printed pages.
    #[serde(default, with = "string_bool", skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
    /// What pages to print.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub print_pages: Option<PrintPages>,
    /// A list of page ranges, formatted like this: 0-2,4,9-11.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
    /// The number of pages per sheet.
    #[serde(default, with = "string_u32", skip_serializing_if = "Option::is_none")]
    pub number_up: Option<u32>,
    /// Format to use for print-to-file.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub output_file_format: Option<OutputFileFormat>,
    /// The uri used for print-to-file.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<url::Url>,
}

impl Settings {
    /// Sets the orientation.
    #[must_use]
    pub fn orientation(mut self, orientation: impl Into<Option<Orientation>>) -> Self {
        self.orientation = orientation.into();
        self
    }

    /// Sets the paper name.
    #[must_use]
    pub fn paper_format<'a>(mut self, paper_format: impl Into<Option<&'a str>>) -> Self {
        self.paper_format = paper_format.into().map(ToOwned::to_owned);
        self
    }

    /// Sets the number of copies to print.
    #[must_use]
    pub fn n_copies(mut self, n_copies: impl Into<Option<u32>>) -> Self {
        self.n_copies = n_copies.into();
        self
    }

    /// Sets the print quality.
    #[must_use]
    pub fn quality(mut self, quality: impl Into<Option<Quality>>) -> Self {
        self.quality = quality.into();
        self
    }

    /// Sets whether to use color.
    #[must_use]
    pub fn use_color(mut self, use_color: impl Into<Option<bool>>) -> Self {
        self.use_color = use_color.into();
        self
    }

    /// Sets whether to collate copies.
    #[must_use]
    pub fn collate(mut self, collate: impl Into<Option<bool>>) -> Self {
        self.collate = collate.into();
        self
    }

    /// Sets whether to reverse the order of the printed pages.
    #[must_use]
    pub fn reverse(mut self, reverse: impl Into<Option<bool>>) -> Self {
        self.reverse = reverse.into();
        self
    }

    /// Sets which pages to print.
    #[must_use]
    pub fn print_pages(mut self, print_pages: impl Into<Option<PrintPages>>) -> Self {
        self.print_pages = print_pages.into();
        self
    }

    /// Sets the page ranges to print.
    #[must_use]
    pub fn page_ranges<'a>(mut self, page_ranges: impl Into<Option<&'a str>>) -> Self {
        self.page_ranges = page_ranges.into().map(ToOwned::to_owned);
        self
    }

    /// Sets the number of pages per sheet.
    #[must_use]
    pub fn number_up(mut self, number_up: impl Into<Option<u32>>) -> Self {
        self.number_up = number_up.into();
        self
    }

    /// Sets the format to use for print-to-file.
    #[must_use]
    pub fn output_file_format(mut self, format: impl Into<Option<OutputFileFormat>>) -> Self {
        self.output_file_format = format.into();
        self
    }

    /// Sets the uri used for print-to-file.
    #[must_use]
    pub fn output_uri<'a>(mut self, output_uri: impl Into<Option<&'a url::Url>>) -> Self {
        self.output_uri = output_uri.into().map(ToOwned::to_owned);
        self
    }
}

#[derive(Serialize, Deserialize, Type, Debug, Default, Clone, PartialEq)]
/// Setup the printed pages.
#[zvariant(signature = "dict")]
#[serde(rename_all = "PascalCase")]
pub struct PageSetup {
    /// The PPD name, selecting a given driver.
    #[serde(rename = "PPDName")]
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub ppdname: Option<String>,
    /// The name of the page setup.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The user-visible name of the page setup.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Paper width in millimeters.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Paper height in millimeters.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Top margin in millimeters.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,
    /// Bottom margin in millimeters.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,
    /// Right margin in millimeters.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,
    /// Left margin in millimeters.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,
    /// The page orientation.
    #[serde(default, with = "optional", skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
}

impl PageSetup {
    /// Sets the name of the page setup.
    #[must_use]
    pub fn name<'a>(mut self, name: impl Into<Option<&'a str>>) -> Self {
        self.name = name.into().map(ToOwned::to_owned);
        self
    }

    /// Sets the orientation.
    #[must_use]
    pub fn orientation(mut self, orientation: impl Into<Option<Orientation>>) -> Self {
        self.orientation = orientation.into();
        self
    }

    /// Sets the paper size, in millimeters.
    #[must_use]
    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the top, bottom, right and left margins, in millimeters.
    #[must_use]
    pub fn margins(mut self, top: f64, bottom: f64, right: f64, left: f64) -> Self {
        self.margin_top = Some(top);
        self.margin_bottom = Some(bottom);
        self.margin_right = Some(right);
        self.margin_left = Some(left);
        self
    }
}

#[derive(Serialize, Type, Debug, Default)]
/// Specified options for a [`PrintProxy::prepare_print`] request.
#[zvariant(signature = "dict")]
#[serde(rename_all = "kebab-case")]
pub struct PreparePrintOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    accept_label: Option<String>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    supported_output_file_formats: Vec<OutputFileFormat>,
}

impl PreparePrintOptions {
    /// Sets whether the dialog should be a modal.
    #[must_use]
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.modal = modal.into();
        self
    }

    /// Label for the accept button. Mnemonic underlines are allowed.
    #[must_use]
    pub fn accept_label<'a>(mut self, accept_label: impl Into<Option<&'a str>>) -> Self {
        self.accept_label = accept_label.into().map(ToOwned::to_owned);
        self
    }

    /// Sets the file formats the application supports for print-to-file.
    /// Added in version 3.
    #[must_use]
    pub fn supported_output_file_formats(
        mut self,
        formats: impl IntoIterator<Item = OutputFileFormat>,
    ) -> Self {
        self.supported_output_file_formats = formats.into_iter().collect();
        self
    }
}

#[derive(Serialize, Type, Debug, Default)]
/// Specified options for a [`PrintProxy::print`] request.
#[zvariant(signature = "dict")]
#[serde(rename_all = "kebab-case")]
pub struct PrintOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    token: Option<u32>,
}

impl PrintOptions {
    /// A token retrieved from [`PrintProxy::prepare_print`].
    #[must_use]
    pub fn token(mut self, token: impl Into<Option<u32>>) -> Self {
        self.token = token.into();
        self
    }

    /// Sets whether the dialog should be a modal.
    #[must_use]
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.modal = modal.into();
        self
    }
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct PreparePrintResponse {
    #[serde(default, with = "optional")]
    settings: Option<Settings>,
    #[serde(default, rename = "page-setup", with = "optional")]
    page_setup: Option<PageSetup>,
    #[serde(default, with = "optional")]
    token: Option<u32>,
}

/// A response to a [`PrintProxy::prepare_print`] request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparePrint {
    settings: Settings,
    page_setup: PageSetup,
    token: u32,
}

impl PreparePrint {
    /// The printing settings picked by the user.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The printed pages setup.
    pub fn page_setup(&self) -> &PageSetup {
        &self.page_setup
    }

    /// The token to pass to [`PrintProxy::print`].
    pub fn token(&self) -> u32 {
        self.token
    }
}

impl TryFrom<PreparePrintResponse> for PreparePrint {
    type Error = ResponseError;

    fn try_from(response: PreparePrintResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            settings: response.settings.unwrap_or_default(),
            page_setup: response.page_setup.unwrap_or_default(),
            token: response
                .token
                .ok_or(ResponseError::ProtocolViolation("token"))?,
        })
    }
}

/// The interface lets sandboxed applications print.
///
/// Wrapper of the DBus interface: [`org.freedesktop.portal.Print`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Print.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.Print")]
pub struct PrintProxy(Proxy);

impl PrintProxy {
    /// Create a new instance of [`PrintProxy`].
    pub async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// Create a new instance of [`PrintProxy`] on `portal`.
    pub async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    /// The version of the interface.
    pub fn version(&self) -> u32 {
        self.0.version()
    }

    /// Presents a print dialog to the user and returns print settings and page
    /// setup.
    ///
    /// # Arguments
    ///
    /// * `identifier` - Identifier for the application window.
    /// * `title` - Title for the print dialog.
    /// * `settings` - [`Settings`].
    /// * `page_setup` - [`PageSetup`].
    /// * `options` - [`PreparePrintOptions`].
    /// * `cancellable` - Closes the dialog once cancelled.
    ///
    /// # Specifications
    ///
    /// See also [`PreparePrint`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Print.html#org-freedesktop-portal-print-prepareprint).
    #[doc(alias = "PreparePrint")]
    #[doc(alias = "xdp_portal_prepare_print")]
    pub async fn prepare_print(
        &self,
        identifier: Option<&WindowIdentifier>,
        title: &str,
        settings: Settings,
        page_setup: PageSetup,
        options: PreparePrintOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<PreparePrint, Error> {
        let identifier = identifier.to_string_or_empty();
        let response = self
            .0
            .request::<PreparePrintResponse>(
                &options.handle_token,
                "PreparePrint",
                (&identifier, title, &settings, &page_setup, &options),
                cancellable,
            )
            .await?;
        Ok(PreparePrint::try_from(response)?)
    }

    /// Asks to print a file.
    ///
    /// The file must be passed in the form of a file descriptor open for
    /// reading. This ensures that sandboxed applications only print files
    /// that they have access to.
    ///
    /// # Specifications
    ///
    /// See also [`Print`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.Print.html#org-freedesktop-portal-print-print).
    #[doc(alias = "Print")]
    #[doc(alias = "xdp_portal_print_file")]
    pub async fn print(
        &self,
        identifier: Option<&WindowIdentifier>,
        title: &str,
        fd: &impl AsFd,
        options: PrintOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<(), Error> {
        let identifier = identifier.to_string_or_empty();
        self.0
            .empty_request(
                &options.handle_token,
                "Print",
                (&identifier, title, Fd::from(fd), &options),
                cancellable,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use zbus::zvariant::{OwnedFd, OwnedValue, Value};

    use super::*;
    use crate::bus::mock::MockBus;

    #[test]
    fn settings_travel_as_strings() {
        let settings = Settings::default()
            .n_copies(2)
            .use_color(false)
            .quality(Quality::High)
            .orientation(Orientation::ReverseLandscape);
        let message = zbus::Message::method_call("/", "PreparePrint")
            .unwrap()
            .build(&(&settings,))
            .unwrap();
        let dict: HashMap<String, OwnedValue> = message.body().deserialize().unwrap();
        assert_eq!(
            String::try_from(dict["n-copies"].try_clone().unwrap()).unwrap(),
            "2"
        );
        assert_eq!(
            String::try_from(dict["use-color"].try_clone().unwrap()).unwrap(),
            "false"
        );
        assert_eq!(
            String::try_from(dict["orientation"].try_clone().unwrap()).unwrap(),
            "reverse_landscape"
        );
        assert!(!dict.contains_key("collate"));
    }

    #[tokio::test]
    async fn prepare_then_print() {
        let bus = MockBus::new(":1.8");
        let mut settings = HashMap::new();
        settings.insert("n-copies", Value::from("3"));
        settings.insert("quality", Value::from("draft"));
        let mut page_setup = HashMap::new();
        page_setup.insert("Width", Value::from(210.0f64));
        page_setup.insert("Height", Value::from(297.0f64));
        bus.respond(
            INTERFACE,
            "PreparePrint",
            0,
            MockBus::results([
                ("settings", Value::from(settings)),
                ("page-setup", Value::from(page_setup)),
                ("token", Value::from(7u32)),
            ]),
        );
        bus.respond(INTERFACE, "Print", 0, HashMap::new());

        let proxy = PrintProxy::with_portal(bus.portal()).await.unwrap();
        let prepared = proxy
            .prepare_print(
                None,
                "Print me",
                Settings::default(),
                PageSetup::default(),
                PreparePrintOptions::default().modal(true),
                None,
            )
            .await
            .unwrap();
        assert_eq!(prepared.token(), 7);
        assert_eq!(prepared.settings().n_copies, Some(3));
        assert_eq!(prepared.settings().quality, Some(Quality::Draft));
        assert_eq!(prepared.page_setup().width, Some(210.0));

        let file = std::fs::File::open("/dev/null").unwrap();
        proxy
            .print(
                None,
                "Print me",
                &file,
                PrintOptions::default().token(prepared.token()),
                None,
            )
            .await
            .unwrap();

        let call = &bus.calls("Print")[0];
        let (parent, title, _fd, options): (String, String, OwnedFd, HashMap<String, OwnedValue>) =
            call.body().deserialize().unwrap();
        assert_eq!(parent, "");
        assert_eq!(title, "Print me");
        assert_eq!(u32::try_from(&options["token"]).unwrap(), 7);
    }

    #[tokio::test]
    async fn missing_token() {
        let bus = MockBus::new(":1.8");
        bus.respond(INTERFACE, "PreparePrint", 0, HashMap::new());
        let proxy = PrintProxy::with_portal(bus.portal()).await.unwrap();
        let err = proxy
            .prepare_print(
                None,
                "",
                Settings::default(),
                PageSetup::default(),
                PreparePrintOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Response(ResponseError::ProtocolViolation("token"))
        ));
    }
}
