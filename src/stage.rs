use crate::error::{Error, Result};

/// A pipeline step over images or image-derived values.
///
/// `BATCHABLE` stages receive the whole batch in one `perform` call, the rest
/// are handed exactly one input at a time.
pub trait Stage {
    type Input<'a>;
    type Output;

    const BATCHABLE: bool;

    fn perform(&self, inputs: &[Self::Input<'_>]) -> Result<Vec<Self::Output>>;

    fn call(&self, input: Self::Input<'_>) -> Result<Self::Output> {
        let mut out = self.perform(std::slice::from_ref(&input))?;
        match out.len() {
            1 => out.pop().ok_or(Error::StageOutput {
                expected: 1,
                actual: 0,
            }),
            actual => Err(Error::StageOutput {
                expected: 1,
                actual,
            }),
        }
    }

    fn call_batch(&self, inputs: &[Self::Input<'_>]) -> Result<Vec<Self::Output>> {
        if Self::BATCHABLE {
            let out = self.perform(inputs)?;
            if out.len() != inputs.len() {
                return Err(Error::StageOutput {
                    expected: inputs.len(),
                    actual: out.len(),
                });
            }
            return Ok(out);
        }

        let mut out = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut single = self.perform(std::slice::from_ref(input))?;
            if single.len() != 1 {
                return Err(Error::StageOutput {
                    expected: 1,
                    actual: single.len(),
                });
            }
            out.append(&mut single);
        }
        Ok(out)
    }
}
