//! The interface lets sandboxed applications ask the user for access to files
//! outside the sandbox. The portal backend will present the user with a file
//! chooser dialog.
//!
//! Wrapper of the DBus interface: [`org.freedesktop.portal.FileChooser`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.FileChooser.html).
//!
//! ### Examples
//!
//! #### Opening a file
//!
//! ```rust,no_run
//! use xdg_portal::desktop::file_chooser::{Choice, FileFilter, SelectedFiles};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let files = SelectedFiles::open_file()
//!         .title("open a file to read")
//!         .accept_label("read")
//!         .modal(true)
//!         .multiple(true)
//!         .choice(
//!             Choice::new("encoding", "Encoding", "latin15")
//!                 .insert("utf8", "Unicode (UTF-8)")
//!                 .insert("latin15", "Western"),
//!         )
//!         // A trick to have a checkbox
//!         .choice(Choice::boolean("re-encode", "Re-encode", false))
//!         .filter(FileFilter::new("SVG Image").mimetype("image/svg+xml"))
//!         .send()
//!         .await?;
//!
//!     println!("{:#?}", files);
//!
//!     Ok(())
//! }
//! ```
//!
//! #### Ask to save a file
//!
//! ```rust,no_run
//! use xdg_portal::desktop::file_chooser::{FileFilter, SelectedFiles};
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let files = SelectedFiles::save_file()
//!         .title("open a file to write")
//!         .accept_label("write")
//!         .current_name("image.jpg")
//!         .modal(true)
//!         .filter(FileFilter::new("JPEG Image").glob("*.jpg"))
//!         .send()
//!         .await?;
//!
//!     println!("{:#?}", files);
//!
//!     Ok(())
//! }
//! ```
//!
//! #### Ask to save multiple files
//!
//! ```rust,no_run
//! use xdg_portal::desktop::file_chooser::SelectedFiles;
//!
//! async fn run() -> xdg_portal::Result<()> {
//!     let files = SelectedFiles::save_files()
//!         .title("open files to write")
//!         .accept_label("write files")
//!         .modal(true)
//!         .current_folder("/home/user/Pictures")?
//!         .files(&["test.jpg", "awesome.png"])?
//!         .send()
//!         .await?;
//!
//!     println!("{:#?}", files);
//!
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::zvariant::{
    as_value::{self, optional},
    Type,
};

use super::{HandleToken, ResponseError};
use crate::{
    file_path::FilePath, proxy::Proxy, window_identifier::MaybeWindowIdentifierExt, Cancellable,
    Error, Portal, WindowIdentifier,
};

const INTERFACE: &str = "org.freedesktop.portal.FileChooser";

#[derive(Clone, Serialize, Deserialize, Type, Debug, PartialEq)]
/// A file filter, to limit the available file choices to a mimetype or a glob
/// pattern.
pub struct FileFilter(String, Vec<(FilterType, String)>);

#[derive(Clone, Serialize_repr, Deserialize_repr, Debug, Type, PartialEq)]
#[repr(u32)]
enum FilterType {
    GlobPattern = 0,
    MimeType = 1,
}

impl FileFilter {
    /// Create a new file filter
    ///
    /// # Arguments
    ///
    /// * `label` - user-visible name of the file filter.
    pub fn new(label: &str) -> Self {
        Self(label.to_owned(), vec![])
    }

    /// Adds a mime type to the file filter.
    #[must_use]
    pub fn mimetype(mut self, mimetype: &str) -> Self {
        self.1.push((FilterType::MimeType, mimetype.to_owned()));
        self
    }

    /// Adds a glob pattern to the file filter.
    #[must_use]
    pub fn glob(mut self, pattern: &str) -> Self {
        self.1.push((FilterType::GlobPattern, pattern.to_owned()));
        self
    }

    /// The label of the filter.
    pub fn label(&self) -> &str {
        &self.0
    }

    /// List of mimetypes filters.
    pub fn mimetype_filters(&self) -> Vec<&str> {
        self.filters(FilterType::MimeType)
    }

    /// List of glob patterns filters.
    pub fn pattern_filters(&self) -> Vec<&str> {
        self.filters(FilterType::GlobPattern)
    }

    fn filters(&self, kind: FilterType) -> Vec<&str> {
        self.1
            .iter()
            .filter_map(|(type_, string)| (*type_ == kind).then_some(string.as_str()))
            .collect()
    }
}

#[derive(Clone, Serialize, Deserialize, Type, Debug)]
/// Presents the user with a choice to select from or as a checkbox.
pub struct Choice(String, String, Vec<(String, String)>, String);

impl Choice {
    /// Creates a checkbox choice.
    ///
    /// # Arguments
    ///
    /// * `id` - A unique identifier of the choice.
    /// * `label` - user-visible name of the choice.
    /// * `state` - the initial state value.
    pub fn boolean(id: &str, label: &str, state: bool) -> Self {
        Self::new(id, label, &state.to_string())
    }

    /// Creates a new choice.
    ///
    /// # Arguments
    ///
    /// * `id` - A unique identifier of the choice.
    /// * `label` - user-visible name of the choice.
    /// * `initial_selection` - the initially selected value.
    pub fn new(id: &str, label: &str, initial_selection: &str) -> Self {
        Self(
            id.to_owned(),
            label.to_owned(),
            vec![],
            initial_selection.to_owned(),
        )
    }

    /// Adds a (key, value) as a choice.
    #[must_use]
    pub fn insert(mut self, key: &str, value: &str) -> Self {
        self.2.push((key.to_owned(), value.to_owned()));
        self
    }

    /// The choice's unique id
    pub fn id(&self) -> &str {
        &self.0
    }

    /// The user visible label of the choice.
    pub fn label(&self) -> &str {
        &self.1
    }

    /// Pairs of choices.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.2
            .iter()
            .map(|(x, y)| (x.as_str(), y.as_str()))
            .collect::<Vec<_>>()
    }

    /// The initially selected value.
    pub fn initial_selection(&self) -> &str {
        &self.3
    }
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct OpenFileOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    accept_label: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    multiple: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    directory: Option<bool>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    filters: Vec<FileFilter>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_filter: Option<FileFilter>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    choices: Vec<Choice>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_folder: Option<FilePath>,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct SaveFileOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    accept_label: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_name: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_folder: Option<FilePath>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_file: Option<FilePath>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    filters: Vec<FileFilter>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_filter: Option<FileFilter>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    choices: Vec<Choice>,
}

#[derive(Serialize, Type, Debug, Default)]
#[zvariant(signature = "dict")]
struct SaveFilesOptions {
    #[serde(with = "as_value")]
    handle_token: HandleToken,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    accept_label: Option<String>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    modal: Option<bool>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    choices: Vec<Choice>,
    #[serde(with = "optional", skip_serializing_if = "Option::is_none")]
    current_folder: Option<FilePath>,
    #[serde(with = "as_value", skip_serializing_if = "Vec::is_empty")]
    files: Vec<FilePath>,
}

#[derive(Deserialize, Type, Debug)]
#[zvariant(signature = "dict")]
struct SelectedFilesResponse {
    #[serde(default, with = "optional")]
    uris: Option<Vec<url::Url>>,
    #[serde(default, with = "optional")]
    choices: Option<Vec<(String, String)>>,
    #[serde(default, with = "optional")]
    current_filter: Option<FileFilter>,
}

#[derive(Debug, Clone)]
/// A response of [`OpenFileRequest`], [`SaveFileRequest`] or
/// [`SaveFilesRequest`].
pub struct SelectedFiles {
    uris: Vec<url::Url>,
    choices: Vec<(String, String)>,
    current_filter: Option<FileFilter>,
}

impl TryFrom<SelectedFilesResponse> for SelectedFiles {
    type Error = ResponseError;

    fn try_from(response: SelectedFilesResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            uris: response
                .uris
                .ok_or(ResponseError::ProtocolViolation("uris"))?,
            choices: response.choices.unwrap_or_default(),
            current_filter: response.current_filter,
        })
    }
}

impl SelectedFiles {
    /// Start an open file request.
    pub fn open_file() -> OpenFileRequest {
        OpenFileRequest::default()
    }

    /// Start a save file request.
    pub fn save_file() -> SaveFileRequest {
        SaveFileRequest::default()
    }

    /// Start a save files request.
    pub fn save_files() -> SaveFilesRequest {
        SaveFilesRequest::default()
    }

    /// The selected files uris.
    pub fn uris(&self) -> &[url::Url] {
        self.uris.as_slice()
    }

    /// The selected value of each choice as a tuple of (key, value)
    pub fn choices(&self) -> &[(String, String)] {
        &self.choices
    }

    /// The filter that was selected, not sent for [`SaveFilesRequest`].
    pub fn current_filter(&self) -> Option<&FileFilter> {
        self.current_filter.as_ref()
    }
}

/// Wrapper of the DBus interface: [`org.freedesktop.portal.FileChooser`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.FileChooser.html).
#[derive(Debug)]
#[doc(alias = "org.freedesktop.portal.FileChooser")]
struct FileChooserProxy(Proxy);

impl FileChooserProxy {
    async fn new() -> Result<Self, Error> {
        let proxy = Proxy::new_desktop(INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn with_portal(portal: Portal) -> Result<Self, Error> {
        let proxy = Proxy::new_desktop_with_portal(portal, INTERFACE).await?;
        Ok(Self(proxy))
    }

    async fn selected_files(
        &self,
        handle_token: &HandleToken,
        method_name: &'static str,
        body: impl Serialize + Type + std::fmt::Debug,
        cancellable: Option<&Cancellable>,
    ) -> Result<SelectedFiles, Error> {
        let response = self
            .0
            .request::<SelectedFilesResponse>(handle_token, method_name, body, cancellable)
            .await?;
        Ok(SelectedFiles::try_from(response)?)
    }

    /// Asks to open one or more files.
    ///
    /// See also [`OpenFile`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.FileChooser.html#org-freedesktop-portal-filechooser-openfile).
    #[doc(alias = "OpenFile")]
    async fn open_file(
        &self,
        identifier: Option<&WindowIdentifier>,
        title: &str,
        options: OpenFileOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<SelectedFiles, Error> {
        let identifier = identifier.to_string_or_empty();
        self.selected_files(
            &options.handle_token,
            "OpenFile",
            &(&identifier, title, &options),
            cancellable,
        )
        .await
    }

    /// Asks for a location to save a file.
    ///
    /// See also [`SaveFile`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.FileChooser.html#org-freedesktop-portal-filechooser-savefile).
    #[doc(alias = "SaveFile")]
    async fn save_file(
        &self,
        identifier: Option<&WindowIdentifier>,
        title: &str,
        options: SaveFileOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<SelectedFiles, Error> {
        let identifier = identifier.to_string_or_empty();
        self.selected_files(
            &options.handle_token,
            "SaveFile",
            &(&identifier, title, &options),
            cancellable,
        )
        .await
    }

    /// Asks for a location to save one or more files.
    ///
    /// See also [`SaveFiles`](https://flatpak.github.io/xdg-desktop-portal/docs/doc-org.freedesktop.portal.FileChooser.html#org-freedesktop-portal-filechooser-savefiles).
    #[doc(alias = "SaveFiles")]
    async fn save_files(
        &self,
        identifier: Option<&WindowIdentifier>,
        title: &str,
        options: SaveFilesOptions,
        cancellable: Option<&Cancellable>,
    ) -> Result<SelectedFiles, Error> {
        let identifier = identifier.to_string_or_empty();
        self.selected_files(
            &options.handle_token,
            "SaveFiles",
            &(&identifier, title, &options),
            cancellable,
        )
        .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_open_file")]
/// A [builder-pattern] type to open a file.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct OpenFileRequest {
    identifier: Option<WindowIdentifier>,
    title: String,
    options: OpenFileOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl OpenFileRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Sets a title for the file chooser dialog.
    #[must_use]
    pub fn title<'a>(mut self, title: impl Into<Option<&'a str>>) -> Self {
        self.title = title.into().map(ToOwned::to_owned).unwrap_or_default();
        self
    }

    /// Sets a user-visible string to the "accept" button.
    #[must_use]
    pub fn accept_label<'a>(mut self, accept_label: impl Into<Option<&'a str>>) -> Self {
        self.options.accept_label = accept_label.into().map(ToOwned::to_owned);
        self
    }

    /// Sets whether the dialog should be a modal.
    #[must_use]
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.options.modal = modal.into();
        self
    }

    /// Sets whether to allow multiple files selection.
    #[must_use]
    pub fn multiple(mut self, multiple: impl Into<Option<bool>>) -> Self {
        self.options.multiple = multiple.into();
        self
    }

    /// Sets whether to select directories or not.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<Option<bool>>) -> Self {
        self.options.directory = directory.into();
        self
    }

    /// Adds a files filter.
    #[must_use]
    pub fn filter(mut self, filter: FileFilter) -> Self {
        self.options.filters.push(filter);
        self
    }

    #[must_use]
    /// Adds a list of files filters.
    pub fn filters(mut self, filters: impl IntoIterator<Item = FileFilter>) -> Self {
        self.options.filters = filters.into_iter().collect();
        self
    }

    /// Specifies the default filter.
    #[must_use]
    pub fn current_filter(mut self, current_filter: impl Into<Option<FileFilter>>) -> Self {
        self.options.current_filter = current_filter.into();
        self
    }

    /// Adds a choice.
    #[must_use]
    pub fn choice(mut self, choice: Choice) -> Self {
        self.options.choices.push(choice);
        self
    }

    #[must_use]
    /// Adds a list of choices.
    pub fn choices(mut self, choices: impl IntoIterator<Item = Choice>) -> Self {
        self.options.choices = choices.into_iter().collect();
        self
    }

    /// Specifies the current folder path.
    pub fn current_folder<P: AsRef<Path>>(
        mut self,
        current_folder: impl Into<Option<P>>,
    ) -> Result<Self, Error> {
        self.options.current_folder = current_folder.into().map(FilePath::new).transpose()?;
        Ok(self)
    }

    #[must_use]
    /// Closes the dialog once `cancellable` is cancelled.
    pub fn cancellable(mut self, cancellable: &Cancellable) -> Self {
        self.cancellable = Some(cancellable.clone());
        self
    }

    #[must_use]
    /// Sets a portal context to use other than the global one.
    pub fn portal(mut self, portal: Option<Portal>) -> Self {
        self.portal = portal;
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<SelectedFiles, Error> {
        let proxy = if let Some(portal) = self.portal {
            FileChooserProxy::with_portal(portal).await?
        } else {
            FileChooserProxy::new().await?
        };
        proxy
            .open_file(
                self.identifier.as_ref(),
                &self.title,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_save_file")]
/// A [builder-pattern] type to save a file.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct SaveFileRequest {
    identifier: Option<WindowIdentifier>,
    title: String,
    options: SaveFileOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl SaveFileRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Sets a title for the file chooser dialog.
    #[must_use]
    pub fn title<'a>(mut self, title: impl Into<Option<&'a str>>) -> Self {
        self.title = title.into().map(ToOwned::to_owned).unwrap_or_default();
        self
    }

    /// Sets a user-visible string to the "accept" button.
    #[must_use]
    pub fn accept_label<'a>(mut self, accept_label: impl Into<Option<&'a str>>) -> Self {
        self.options.accept_label = accept_label.into().map(ToOwned::to_owned);
        self
    }

    /// Sets whether the dialog should be a modal.
    #[must_use]
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.options.modal = modal.into();
        self
    }

    /// Sets the current file name.
    #[must_use]
    pub fn current_name<'a>(mut self, current_name: impl Into<Option<&'a str>>) -> Self {
        self.options.current_name = current_name.into().map(ToOwned::to_owned);
        self
    }

    /// Sets the current folder.
    pub fn current_folder<P: AsRef<Path>>(
        mut self,
        current_folder: impl Into<Option<P>>,
    ) -> Result<Self, Error> {
        self.options.current_folder = current_folder.into().map(FilePath::new).transpose()?;
        Ok(self)
    }

    /// Sets the absolute path of the file.
    pub fn current_file<P: AsRef<Path>>(
        mut self,
        current_file: impl Into<Option<P>>,
    ) -> Result<Self, Error> {
        self.options.current_file = current_file.into().map(FilePath::new).transpose()?;
        Ok(self)
    }

    /// Adds a files filter.
    #[must_use]
    pub fn filter(mut self, filter: FileFilter) -> Self {
        self.options.filters.push(filter);
        self
    }

    #[must_use]
    /// Adds a list of files filters.
    pub fn filters(mut self, filters: impl IntoIterator<Item = FileFilter>) -> Self {
        self.options.filters = filters.into_iter().collect();
        self
    }

    /// Sets the default filter.
    #[must_use]
    pub fn current_filter(mut self, current_filter: impl Into<Option<FileFilter>>) -> Self {
        self.options.current_filter = current_filter.into();
        self
    }

    /// Adds a choice.
    #[must_use]
    pub fn choice(mut self, choice: Choice) -> Self {
        self.options.choices.push(choice);
        self
    }

    #[must_use]
    /// Adds a list of choices.
    pub fn choices(mut self, choices: impl IntoIterator<Item = Choice>) -> Self {
        self.options.choices = choices.into_iter().collect();
        self
    }

    #[must_use]
    /// Closes the dialog once `cancellable` is cancelled.
    pub fn cancellable(mut self, cancellable: &Cancellable) -> Self {
        self.cancellable = Some(cancellable.clone());
        self
    }

    #[must_use]
    /// Sets a portal context to use other than the global one.
    pub fn portal(mut self, portal: Option<Portal>) -> Self {
        self.portal = portal;
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<SelectedFiles, Error> {
        let proxy = if let Some(portal) = self.portal {
            FileChooserProxy::with_portal(portal).await?
        } else {
            FileChooserProxy::new().await?
        };
        proxy
            .save_file(
                self.identifier.as_ref(),
                &self.title,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}

#[derive(Debug, Default)]
#[doc(alias = "xdp_portal_save_files")]
/// A [builder-pattern] type to save multiple files.
///
/// [builder-pattern]: https://doc.rust-lang.org/1.0.0/style/ownership/builders.html
pub struct SaveFilesRequest {
    identifier: Option<WindowIdentifier>,
    title: String,
    options: SaveFilesOptions,
    cancellable: Option<Cancellable>,
    portal: Option<Portal>,
}

impl SaveFilesRequest {
    #[must_use]
    /// Sets a window identifier.
    pub fn identifier(mut self, identifier: impl Into<Option<WindowIdentifier>>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Sets a title for the file chooser dialog.
    #[must_use]
    pub fn title<'a>(mut self, title: impl Into<Option<&'a str>>) -> Self {
        self.title = title.into().map(ToOwned::to_owned).unwrap_or_default();
        self
    }

    /// Sets a user-visible string to the "accept" button.
    #[must_use]
    pub fn accept_label<'a>(mut self, accept_label: impl Into<Option<&'a str>>) -> Self {
        self.options.accept_label = accept_label.into().map(ToOwned::to_owned);
        self
    }

    /// Sets whether the dialog should be a modal.
    #[must_use]
    pub fn modal(mut self, modal: impl Into<Option<bool>>) -> Self {
        self.options.modal = modal.into();
        self
    }

    /// Adds a choice.
    #[must_use]
    pub fn choice(mut self, choice: Choice) -> Self {
        self.options.choices.push(choice);
        self
    }

    #[must_use]
    /// Adds a list of choices.
    pub fn choices(mut self, choices: impl IntoIterator<Item = Choice>) -> Self {
        self.options.choices = choices.into_iter().collect();
        self
    }

    /// Specifies the current folder path.
    pub fn current_folder<P: AsRef<Path>>(
        mut self,
        current_folder: impl Into<Option<P>>,
    ) -> Result<Self, Error> {
        self.options.current_folder = current_folder.into().map(FilePath::new).transpose()?;
        Ok(self)
    }

    /// Sets a list of files to save.
    pub fn files<P: IntoIterator<Item = impl AsRef<Path>>>(
        mut self,
        files: impl Into<Option<P>>,
    ) -> Result<Self, Error> {
        if let Some(f) = files.into() {
            self.options.files = f
                .into_iter()
                .map(FilePath::new)
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(self)
    }

    #[must_use]
    /// Closes the dialog once `cancellable` is cancelled.
    pub fn cancellable(mut self, cancellable: &Cancellable) -> Self {
        self.cancellable = Some(cancellable.clone());
        self
    }

    #[must_use]
    /// Sets a portal context to use other than the global one.
    pub fn portal(mut self, portal: Option<Portal>) -> Self {
        self.portal = portal;
        self
    }

    /// Send the request.
    pub async fn send(self) -> Result<SelectedFiles, Error> {
        let proxy = if let Some(portal) = self.portal {
            FileChooserProxy::with_portal(portal).await?
        } else {
            FileChooserProxy::new().await?
        };
        proxy
            .save_files(
                self.identifier.as_ref(),
                &self.title,
                self.options,
                self.cancellable.as_ref(),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use zbus::zvariant::{OwnedValue, Value};

    use super::*;
    use crate::bus::mock::{MockBus, Reply};

    #[derive(Deserialize, Type)]
    #[zvariant(signature = "dict")]
    struct SentOptions {
        #[serde(default, with = "optional")]
        handle_token: Option<String>,
        #[serde(default, with = "optional")]
        multiple: Option<bool>,
        #[serde(default, with = "optional")]
        filters: Option<Vec<FileFilter>>,
        #[serde(default, with = "optional")]
        current_folder: Option<FilePath>,
    }

    #[tokio::test]
    async fn open_file() {
        let bus = MockBus::new(":1.9");
        bus.respond(
            INTERFACE,
            "OpenFile",
            0,
            MockBus::results([("uris", Value::from(vec!["file:///tmp/a"]))]),
        );
        let files = SelectedFiles::open_file()
            .title("Open")
            .multiple(true)
            .filter(FileFilter::new("SVG Image").mimetype("image/svg+xml"))
            .current_folder("/tmp")
            .unwrap()
            .portal(Some(bus.portal()))
            .send()
            .await
            .unwrap();
        assert_eq!(files.uris().len(), 1);
        assert_eq!(files.uris()[0].as_str(), "file:///tmp/a");
        assert!(files.choices().is_empty());

        let call = &bus.calls("OpenFile")[0];
        let (parent, title, options): (String, String, SentOptions) =
            call.body().deserialize().unwrap();
        assert_eq!(parent, "");
        assert_eq!(title, "Open");
        assert!(options
            .handle_token
            .unwrap()
            .starts_with("xdgportal_"));
        assert_eq!(options.multiple, Some(true));
        let filters = options.filters.unwrap();
        assert_eq!(filters[0].label(), "SVG Image");
        assert_eq!(filters[0].mimetype_filters(), vec!["image/svg+xml"]);
        assert_eq!(
            options.current_folder.unwrap().as_ref(),
            std::path::Path::new("/tmp")
        );
    }

    #[tokio::test]
    async fn missing_uris() {
        let bus = MockBus::new(":1.9");
        bus.respond(INTERFACE, "SaveFile", 0, HashMap::<String, OwnedValue>::new());
        let err = SelectedFiles::save_file()
            .current_name("a.txt")
            .portal(Some(bus.portal()))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Response(ResponseError::ProtocolViolation("uris"))
        ));
    }

    #[tokio::test]
    async fn cancelled_dialog() {
        let bus = MockBus::new(":1.9");
        bus.script(INTERFACE, "SaveFiles", Reply::Pending);
        let cancellable = Cancellable::new();
        let request = SelectedFiles::save_files()
            .files(["a.txt", "b.txt"])
            .unwrap()
            .cancellable(&cancellable)
            .portal(Some(bus.portal()))
            .send();
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancellable.cancel();
        };
        let (result, ()) = futures_util::join!(request, cancel);
        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(bus.sent("Close").len(), 1);
    }
}
