mod callbacks;
