mod overbuy_workflow;
mod screening_workflow;
