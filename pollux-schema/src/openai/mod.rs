mod model_list;
mod responses_error;
mod responses_request;

pub use model_list::{OpenaiModel, OpenaiModelList};
pub use responses_error::{OpenaiResponsesErrorBody, OpenaiResponsesErrorObject};
pub use responses_request::{
    OpenaiInput, OpenaiInputContent, OpenaiInputItem, OpenaiRequestBody, Reasoning,
};
