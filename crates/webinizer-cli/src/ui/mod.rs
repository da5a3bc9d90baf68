mod spinner;

pub use spinner::BuildSpinner;
