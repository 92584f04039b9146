/// Anything that contributes a suffix to an artifact file name.
pub trait FileExtProvider {
    fn file_ext(&self) -> Option<&'static str>;
}

/// Joins the suffixes of every stage in order, `None` stages contribute nothing.
pub fn joined_ext<'a, I: IntoIterator<Item = &'a dyn FileExtProvider>>(stages: I) -> String {
    stages
        .into_iter()
        .filter_map(FileExtProvider::file_ext)
        .map(|ext| format!(".{ext}"))
        .collect()
}
