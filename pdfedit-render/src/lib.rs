pub mod layout;

#[cfg(feature = "pdf")]
mod pdfium;

#[cfg(feature = "pdf")]
pub use pdfium::PdfiumProvider;

#[cfg(feature = "pdf")]
pub type PdfProvider = PdfiumProvider;
