use super::Tensor;
use std::fmt;

const PREVIEW: usize = 8;

impl<T: fmt::Debug> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: Vec<&T> = self.data.iter().take(PREVIEW).collect();
        write!(f, "Tensor(shape={:?}, data={:?}", self.shape, preview)?;
        if self.data.len() > PREVIEW {
            write!(f, " ... {} more", self.data.len() - PREVIEW)?;
        }
        write!(f, ")")
    }
}
